use bitflags::bitflags;

bitflags! {
    /// This is a bitmask of flags that can be passed to the `open` syscall as
    /// parameter `flags`. It modifies the behavior when accessing and creating
    /// the file it opens.
    ///
    /// Defined in <bits/fcntl-linux.h>. See `man 2 open` for more information.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: i32 {
        /* File access modes. */

        // Note: `bitflags` crate do not encourage zero bit flag, we should not
        // directly check `O_RDONLY`. Call `readable()` instead.
        const O_RDONLY      = 0;
        const O_WRONLY      = 1;
        const O_RDWR        = 2;

        /* File creation flags. */
        const O_CREAT       = 0o100;
        const O_EXCL        = 0o200;
        const O_TRUNC       = 0o1000;

        /* File status flags. */
        const O_APPEND      = 0o2000;
        const O_NONBLOCK    = 0o4000;
        const O_SYNC        = 0o4010000;
    }
}

impl OpenFlags {
    /// A file `open`ed with this flags can be read.
    pub fn readable(&self) -> bool {
        // Not being write-only means it is readable.
        !self.contains(Self::O_WRONLY)
    }

    /// A file `open`ed with this flags can be written.
    pub fn writable(&self) -> bool {
        // Being read-write or write-only means it is writable.
        self.contains(Self::O_RDWR) || self.contains(Self::O_WRONLY)
    }
}

/// Whence argument of a file seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(usize),
    Current(isize),
    End(isize),
}

/// Why a byte offset is being mapped to a device block.
///
/// Mapping for a write lets the filesystem allocate a backing block on the
/// spot; mapping for a read never allocates, and a missing block reads as a
/// hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmapMode {
    ForReading,
    ForWriting,
}
