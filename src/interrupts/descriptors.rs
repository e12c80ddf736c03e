//! Bit layouts of GDT segment descriptors and IDT gates.
//!
//! ```text
//! segment descriptor (8 bytes)
//!  63      56 55  52 51  48 47      40 39      32 31            16 15             0
//! | base hi  | flags| lim hi| access   | base mid | base low        | limit low      |
//!
//! interrupt gate (16 bytes)
//!  63             48 47  40 39  32 31             16 15             0
//! | offset mid      | attr | ist  | selector        | offset low      |
//! | reserved                      | offset high (bits 32..63)         |
//! ```

/// Present, ring 0, code, readable.
pub const ACCESS_KERNEL_CODE: u8 = 0x9a;
/// Present, ring 0, data, writable.
pub const ACCESS_KERNEL_DATA: u8 = 0x92;
pub const ACCESS_USER_CODE: u8 = 0xfa;
pub const ACCESS_USER_DATA: u8 = 0xf2;
/// Present, ring 0, available 64-bit TSS.
pub const ACCESS_TSS: u8 = 0x89;

/// 4 KiB granularity, long-mode code.
pub const FLAGS_CODE: u8 = 0xa;
/// 4 KiB granularity, 32-bit default size.
pub const FLAGS_DATA: u8 = 0xc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GdtEntry {
    pub limit_low: u16,
    pub base_low: u16,
    pub base_mid: u8,
    pub access: u8,
    /// Low nibble: limit bits 16..20. High nibble: flags.
    pub granularity: u8,
    pub base_high: u8,
}

impl GdtEntry {
    pub const NULL: Self = Self::new(0, 0, 0, 0);

    pub const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        Self {
            limit_low: limit as u16,
            base_low: base as u16,
            base_mid: (base >> 16) as u8,
            access,
            granularity: ((limit >> 16) as u8 & 0x0f) | (flags << 4),
            base_high: (base >> 24) as u8,
        }
    }

    pub const fn kernel_code() -> Self {
        Self::new(0, 0xfffff, ACCESS_KERNEL_CODE, FLAGS_CODE)
    }

    pub const fn kernel_data() -> Self {
        Self::new(0, 0xfffff, ACCESS_KERNEL_DATA, FLAGS_DATA)
    }

    pub const fn user_code() -> Self {
        Self::new(0, 0xfffff, ACCESS_USER_CODE, FLAGS_CODE)
    }

    pub const fn user_data() -> Self {
        Self::new(0, 0xfffff, ACCESS_USER_DATA, FLAGS_DATA)
    }

    pub const fn encode(&self) -> u64 {
        (self.limit_low as u64)
            | (self.base_low as u64) << 16
            | (self.base_mid as u64) << 32
            | (self.access as u64) << 40
            | (self.granularity as u64) << 48
            | (self.base_high as u64) << 56
    }

    pub const fn decode(raw: u64) -> Self {
        Self {
            limit_low: raw as u16,
            base_low: (raw >> 16) as u16,
            base_mid: (raw >> 32) as u8,
            access: (raw >> 40) as u8,
            granularity: (raw >> 48) as u8,
            base_high: (raw >> 56) as u8,
        }
    }

    pub const fn base(&self) -> u32 {
        self.base_low as u32 | (self.base_mid as u32) << 16 | (self.base_high as u32) << 24
    }

    pub const fn limit(&self) -> u32 {
        self.limit_low as u32 | ((self.granularity & 0x0f) as u32) << 16
    }

    pub const fn dpl(&self) -> u8 {
        (self.access >> 5) & 0b11
    }
}

/// The two GDT slots of a 64-bit TSS descriptor.
pub const fn tss_descriptor(base: u64, limit: u32) -> [u64; 2] {
    let low = GdtEntry::new(base as u32, limit, ACCESS_TSS, 0).encode();
    [low, base >> 32]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateType {
    Interrupt = 0xe,
    Trap = 0xf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdtEntry {
    pub offset_low: u16,
    pub selector: u16,
    pub ist: u8,
    pub type_attr: u8,
    pub offset_mid: u16,
    pub offset_high: u32,
}

impl IdtEntry {
    pub const MISSING: Self = Self {
        offset_low: 0,
        selector: 0,
        ist: 0,
        type_attr: 0,
        offset_mid: 0,
        offset_high: 0,
    };

    /// A present gate. `ist` is the 1-based IST slot, 0 for none.
    pub const fn new(handler: u64, selector: u16, gate: GateType, dpl: u8, ist: u8) -> Self {
        Self {
            offset_low: handler as u16,
            selector,
            ist: ist & 0b111,
            type_attr: 0x80 | (dpl & 0b11) << 5 | gate as u8,
            offset_mid: (handler >> 16) as u16,
            offset_high: (handler >> 32) as u32,
        }
    }

    pub const fn encode(&self) -> [u64; 2] {
        let low = (self.offset_low as u64)
            | (self.selector as u64) << 16
            | (self.ist as u64) << 32
            | (self.type_attr as u64) << 40
            | (self.offset_mid as u64) << 48;
        [low, self.offset_high as u64]
    }

    pub const fn decode(raw: [u64; 2]) -> Self {
        Self {
            offset_low: raw[0] as u16,
            selector: (raw[0] >> 16) as u16,
            ist: (raw[0] >> 32) as u8 & 0b111,
            type_attr: (raw[0] >> 40) as u8,
            offset_mid: (raw[0] >> 48) as u16,
            offset_high: raw[1] as u32,
        }
    }

    pub const fn handler(&self) -> u64 {
        self.offset_low as u64 | (self.offset_mid as u64) << 16 | (self.offset_high as u64) << 32
    }

    pub const fn is_present(&self) -> bool {
        self.type_attr & 0x80 != 0
    }

    pub const fn dpl(&self) -> u8 {
        (self.type_attr >> 5) & 0b11
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_segments_encode_to_canonical_values() {
        assert_eq!(GdtEntry::kernel_code().encode(), 0x00af_9a00_0000_ffff);
        assert_eq!(GdtEntry::kernel_data().encode(), 0x00cf_9200_0000_ffff);
        assert_eq!(GdtEntry::user_code().encode(), 0x00af_fa00_0000_ffff);
        assert_eq!(GdtEntry::user_data().encode(), 0x00cf_f200_0000_ffff);
        assert_eq!(GdtEntry::NULL.encode(), 0);
    }

    #[test]
    fn segment_fields_survive_decode() {
        let entry = GdtEntry::new(0x1234_5678, 0xabcde, ACCESS_KERNEL_DATA, FLAGS_DATA);
        let decoded = GdtEntry::decode(entry.encode());
        assert_eq!(decoded, entry);
        assert_eq!(decoded.base(), 0x1234_5678);
        assert_eq!(decoded.limit(), 0xabcde);
        assert_eq!(GdtEntry::user_data().dpl(), 3);
    }

    #[test]
    fn tss_descriptor_splits_base() {
        let [low, high] = tss_descriptor(0xffff_8000_1234_5678, 0x67);
        let entry = GdtEntry::decode(low);
        assert_eq!(entry.base(), 0x1234_5678);
        assert_eq!(entry.limit(), 0x67);
        assert_eq!(entry.access, ACCESS_TSS);
        assert_eq!(high, 0xffff_8000);
    }

    #[test]
    fn gate_offset_is_split_across_three_fields() {
        let handler = 0xffff_8000_dead_beef;
        let gate = IdtEntry::new(handler, 0x08, GateType::Interrupt, 0, 0);
        assert_eq!(gate.offset_low, 0xbeef);
        assert_eq!(gate.offset_mid, 0xdead);
        assert_eq!(gate.offset_high, 0xffff_8000);
        assert_eq!(gate.type_attr, 0x8e);

        let decoded = IdtEntry::decode(gate.encode());
        assert_eq!(decoded, gate);
        assert_eq!(decoded.handler(), handler);
    }

    #[test]
    fn user_callable_trap_gate() {
        let gate = IdtEntry::new(0x1000, 0x08, GateType::Trap, 3, 0);
        assert_eq!(gate.type_attr, 0xef);
        assert!(gate.is_present());
        assert_eq!(gate.dpl(), 3);
    }

    #[test]
    fn ist_slot_is_three_bits() {
        let gate = IdtEntry::new(0x1000, 0x08, GateType::Interrupt, 0, 1);
        assert_eq!(IdtEntry::decode(gate.encode()).ist, 1);
        assert_eq!(gate.encode()[0] >> 32 & 0xff, 1);
        assert!(!IdtEntry::MISSING.is_present());
    }
}
