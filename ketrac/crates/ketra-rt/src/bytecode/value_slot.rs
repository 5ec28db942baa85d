//! Encoding for `oop` operands that can address either stack.
//!
//! Most `Wide` operands have a fixed home (always the prim stack, or
//! always the object stack, decided by which opcode they appear on). The
//! array/map/weak-map/union sub-operations of `oop` are the exception:
//! an element or union payload can be either a scalar or a heap value, so
//! the operand itself has to say which stack its index is relative to.
//! Bit 11 carries that tag; the low 11 bits are the index. 11 bits (rather
//! than a full 16) keeps the scheme identical whether the value landed in
//! a hardware `op1` field (12 bits, shared with every other `Wide`
//! opcode) or in `oop`'s wider op2 subfield.

const TAG_BIT: u16 = 0x800;
const INDEX_MASK: u16 = 0x7FF;

/// Pack a local slot reference into one `oop` value operand.
pub fn encode_value_slot(is_object: bool, index: u16) -> u16 {
    debug_assert!(index <= INDEX_MASK, "local slot index {index} exceeds the 11-bit oop value-operand budget");
    if is_object {
        TAG_BIT | (index & INDEX_MASK)
    } else {
        index & INDEX_MASK
    }
}

/// Unpack an `oop` value operand into (is_object, index).
pub fn decode_value_slot(raw: u16) -> (bool, i32) {
    (raw & TAG_BIT != 0, (raw & INDEX_MASK) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_prim_and_object_tags() {
        assert_eq!(decode_value_slot(encode_value_slot(false, 17)), (false, 17));
        assert_eq!(decode_value_slot(encode_value_slot(true, 17)), (true, 17));
    }
}
