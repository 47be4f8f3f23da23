//! Loading and listing of ELF executables.

use crate::error::CliError;
use goblin::elf::program_header::{PF_X, PT_LOAD};
use goblin::elf::{Elf, ProgramHeader};
use hv2_core::board::Board;
use hv2_core::core::{attribute, MappingEntry, MAP_ENTRIES};
use hv2_core::instruction::Instruction;
use log::{debug, info};
use std::io::Write;

/// One mapping entry stays free for the I/O window.
pub const MAX_SEGMENTS: usize = MAP_ENTRIES - 1;

const PAGE_SIZE: u64 = 0x1000;

fn loadable_segments<'a>(elf: &'a Elf) -> impl Iterator<Item = &'a ProgramHeader> {
    elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD)
}

/// Copies every loadable segment of `image` into main memory and maps it at its virtual address.
///
/// Segments are packed page-aligned from the start of main memory. Map 0 receives one entry per
/// segment, with the segment's permissions, plus an identity read/write entry for the I/O window.
/// The MMU is enabled and the program counter set to the entry point.
pub fn load_elf(board: &mut Board, image: &[u8]) -> Result<(), CliError> {
    let elf = Elf::parse(image)?;
    let segments: Vec<_> = loadable_segments(&elf).collect();
    if segments.len() > MAX_SEGMENTS {
        return Err(CliError::TooManySegments(segments.len()));
    }

    let memory = board.memory_range();
    let mut cursor = memory.start() as u64;
    for (index, header) in segments.into_iter().enumerate() {
        let data = image
            .get(header.file_range())
            .ok_or(CliError::SegmentOutOfFile { index })?;
        let size = header.p_memsz.max(header.p_filesz);
        let end = cursor + size;
        if end > memory.end() {
            return Err(CliError::SegmentTooLarge { index, size });
        }

        debug!(
            "loading segment {index} [{:#010x}..{:#010x}] at {cursor:#010x}",
            header.p_vaddr,
            header.p_vaddr + size
        );
        board.load_physical(cursor as u32, data);
        board.load_physical(
            (cursor + data.len() as u64) as u32,
            &vec![0; (size - data.len() as u64) as usize],
        );
        board
            .core_mut()
            .mmu_mut()
            .map_mut(0)
            .insert(MappingEntry {
                physical_base: cursor as u32,
                virtual_base: header.p_vaddr as u32,
                size: size as u32,
                attributes: header.p_flags & (attribute::EXECUTE | attribute::WRITE | attribute::READ),
            })?;

        cursor = (end + PAGE_SIZE - 1) & !(PAGE_SIZE - 1);
    }

    let core = board.core_mut();
    if let Some(window) = core.bus().io_window() {
        core.mmu_mut().map_mut(0).insert(MappingEntry {
            physical_base: window.start(),
            virtual_base: window.start(),
            size: window.len() as u32,
            attributes: attribute::READ | attribute::WRITE,
        })?;
    }
    core.mmu_mut().control_mut().set_enabled(true);
    core.set_pc(elf.entry as u32);
    info!("loaded ELF, entry point {:#010x}", elf.entry);
    Ok(())
}

/// Writes a listing of every executable segment of `image` to `out`.
pub fn disassemble<W: Write>(image: &[u8], out: &mut W) -> Result<(), CliError> {
    let elf = Elf::parse(image)?;
    for (index, header) in loadable_segments(&elf).enumerate() {
        if header.p_flags & PF_X == 0 {
            continue;
        }
        let data = image
            .get(header.file_range())
            .ok_or(CliError::SegmentOutOfFile { index })?;
        writeln!(out, "segment {index}:").map_err(CliError::Write)?;
        for (i, chunk) in data.chunks_exact(4).enumerate() {
            let address = (header.p_vaddr as u32).wrapping_add(4 * i as u32);
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let text = match Instruction::decode(word) {
                Ok(instruction) => instruction.to_string(),
                Err(_) => format!(".word {word:#010x}"),
            };
            writeln!(out, "{address:08x}:  {word:08x}  {text}").map_err(CliError::Write)?;
        }
    }
    Ok(())
}
