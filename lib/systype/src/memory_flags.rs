//! Module for abstracting memory permissions.

use bitflags::bitflags;

bitflags! {
    /// Memory protection/access flags for system calls like `mmap`.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MmapProt: i32 {
        /// No access.
        const PROT_NONE = 0x0;
        /// Page can be read.
        const PROT_READ = 0x1;
        /// Page can be written.
        const PROT_WRITE = 0x2;
        /// Page can be executed.
        const PROT_EXEC = 0x4;
    }
}

bitflags! {
    /// Flags for `mmap` system call that specify how the memory should be mapped.
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MmapFlags: i32 {
        /// Share changes.
        const MAP_SHARED = 0x01;
        /// Changes are private.
        const MAP_PRIVATE = 0x02;
        /// Interpret addr exactly.
        const MAP_FIXED = 0x10;
        /// The mapping is not backed by any file.
        const MAP_ANONYMOUS = 0x20;
    }
}
