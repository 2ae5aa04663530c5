//! Snapshot format constants shared by the loader and the writer.

/// Magic number carried by the header section.
pub const MAGIC: u32 = 0x6d73_6100;
/// Format version written by [`SnapshotWriter`](crate::SnapshotWriter).
pub const FORMAT_VERSION: u32 = 8;
/// Oldest format version this loader still reads.
pub const COMPATIBLE_VERSION: u32 = 8;
/// Terminator byte of function and value-ref records.
pub const FINISHED_MARK: u8 = 0xff;

/// Top-level section ids.
pub mod section {
    /// Magic, versions, encryption flag
    pub const HEADER: u16 = 1;
    /// String and regex flag tables
    pub const STRING: u16 = 2;
    /// Function records
    pub const FUNCTION: u16 = 3;
    /// Closure reference table
    pub const VALUEREF: u16 = 4;
}

/// Keys inside the header section.
pub mod header_key {
    #![allow(missing_docs)]
    pub const MAGIC: u16 = 0;
    pub const VERSION: u16 = 1;
    pub const COMPATIBLE_VERSION: u16 = 2;
    pub const ENCRYPT: u16 = 3;
}

/// Keys inside the string section.
pub mod string_key {
    #![allow(missing_docs)]
    pub const COUNT: u16 = 0;
    pub const PAYLOAD: u16 = 1;
    pub const FLAG_COUNT: u16 = 2;
    pub const FLAG_PAYLOAD: u16 = 3;
}

/// Keys inside the function section.
pub mod function_key {
    #![allow(missing_docs)]
    pub const COUNT: u16 = 0;
    pub const SUPER: u16 = 1;
    pub const ARGC: u16 = 2;
    pub const STACK_SIZE: u16 = 3;
    pub const CONTEXT_SIZE: u16 = 4;
    pub const STATUS_FLAGS: u16 = 5;
    pub const IN_CLOSURE: u16 = 6;
    pub const OUT_CLOSURE: u16 = 7;
    pub const INSTRUCTIONS: u16 = 8;
    pub const CONSTANT_COUNT: u16 = 9;
    pub const CONSTANT_PAYLOAD: u16 = 10;
    pub const FINISHED: u16 = 255;
}

/// Keys inside the value-ref section.
pub mod value_ref_key {
    #![allow(missing_docs)]
    pub const COUNT: u16 = 0;
    pub const FUNCTION: u16 = 1;
    pub const REGISTER: u16 = 2;
    pub const FINISHED: u16 = 3;
}
