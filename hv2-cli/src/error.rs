use hv2_core::board::BoardError;
use hv2_core::core::MapFullError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("cannot read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write output")]
    Write(#[source] io::Error),
    #[error("invalid ELF file")]
    Elf(#[from] goblin::error::Error),
    #[error("ELF file has {0} loadable segments, at most {max} are supported", max = crate::elf::MAX_SEGMENTS)]
    TooManySegments(usize),
    #[error("segment {index} lies outside of the ELF file")]
    SegmentOutOfFile { index: usize },
    #[error("segment {index} ({size:#x} bytes) does not fit in main memory")]
    SegmentTooLarge { index: usize, size: u64 },
    #[error("mapping table is full")]
    MapFull(#[from] MapFullError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error("nothing to run, pass an ELF file or a BIOS image")]
    NothingToRun,
}
