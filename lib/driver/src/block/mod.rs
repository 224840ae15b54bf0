pub mod ramblk;

pub use self::ramblk::RamBlock;
