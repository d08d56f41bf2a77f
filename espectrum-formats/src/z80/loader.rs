/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
use std::io::{Read, Result};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

use espectrum_core::arch::Architecture;
use espectrum_core::memory::PAGE_SIZE;
use espectrum_peripherals::ay::AyRegister;

use crate::snapshot::*;
use crate::StructRead;

use super::common::*;
use super::decompress::*;

/// Selects the architecture running a snapshot of the `arch` model.
///
/// The current machine is kept if it's compatible with the snapshot.
fn select_arch_for(arch: Architecture, current: Architecture) -> Architecture {
    use Architecture::*;
    match arch {
        Spec48 if current.is_48k_class() => current,
        Spec128|Pentagon => match current {
            Spec128|Pentagon|Plus2A => current,
            _ => arch
        }
        _ => arch
    }
}

/// Loads a **Z80** file into the provided snapshot `loader` from a source.
///
/// Supports versions 1, 2 and 3 of the format. Memory blocks with page numbers not
/// applicable to the selected machine are skipped.
pub fn load_z80<R: Read, S: SnapshotLoader>(
        mut rd: R,
        loader: &mut S
    ) -> Result<()>
{
    let header = Header::read_new_struct(rd.by_ref())?;
    let mut regs = header.registers();

    let (version, header_ex) = if regs.pc == 0 {
        let (version, ahblen, head_ex) = load_header_ex(rd.by_ref())?;
        regs.pc = u16::from_le_bytes(head_ex.pc);
        (version, Some((ahblen, head_ex)))
    }
    else {
        (Z80Version::V1, None)
    };

    let hw_mode = header_ex.as_ref().map(|(_, head_ex)| head_ex.hw_mode).unwrap_or(0);
    let arch = arch_from_hw_mode(version, hw_mode).ok_or_else(||
        invalid_data("Z80: unknown machine")
    )?;
    let arch = select_arch_for(arch, loader.current_arch());

    let flags1 = Flags1::from(header.flags1);
    let flags2 = Flags2::from_bits_truncate(header.flags2);
    loader.select_arch(arch, flags1.border_color()).map_err(select_arch_error)?;
    if arch.is_48k_class() {
        loader.set_issue2(flags2.is_issue2_emulation());
    }

    if version == Z80Version::V1 {
        let is_compressed = flags1.is_mem_compressed();
        let data = read_v1_memory(rd.by_ref(), is_compressed)?;
        let mut ram = vec![0u8; 3 * PAGE_SIZE];
        let len = if is_compressed {
            MemDecompress::new(&data).read(&mut ram)?
        }
        else {
            let len = data.len().min(ram.len());
            ram[..len].copy_from_slice(&data[..len]);
            len
        };
        if len != ram.len() {
            warn!("Z80: the memory is truncated: {} bytes", len);
        }
        for (chunk, &bank) in ram.chunks(PAGE_SIZE).zip(BANKS_48K.iter()) {
            loader.read_into_memory(MemoryRange::ram_bank(bank), chunk)?;
        }
    }
    else {
        let mut buf = Vec::new();
        while let Some((len, page, is_compressed)) = load_mem_header(rd.by_ref())? {
            buf.clear();
            rd.by_ref().take(len as u64).read_to_end(&mut buf)?;
            let range = match mem_page_to_range(page, arch) {
                Some(range) => range,
                None => {
                    warn!("Z80: skipping the memory block of page: {}", page);
                    continue;
                }
            };
            let (data, len) = if is_compressed {
                read_page(MemDecompress::new(&buf))?
            }
            else {
                read_page(&buf[..])?
            };
            if len != PAGE_SIZE {
                warn!("Z80: the memory block of page: {} is truncated: {} bytes", page, len);
            }
            loader.read_into_memory(range, &data[..])?;
        }
    }

    if let Some((ahblen, head_ex)) = header_ex {
        if arch.is_128k_class() {
            if ahblen == HEADER_EX_V3_LENGTH && arch == Architecture::Plus2A {
                loader.write_port(0x1ffd, head_ex.port2);
            }
            loader.write_port(0x7ffd, head_ex.port1);
        }
        if arch.is_128k_class() || Flags3::from_bits_truncate(head_ex.flags3).is_ay_in_use() {
            loader.setup_ay(AyRegister::from(head_ex.ay_sel_reg), &head_ex.ay_regs);
        }
    }

    loader.assign_cpu(regs.into_cpu());
    info!("Z80: loaded {:?} snapshot as {}, PC: 0x{:04x}", version, arch, regs.pc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z80_select_arch_works() {
        use Architecture::*;
        assert_eq!(select_arch_for(Spec48, Tk90x), Tk90x);
        assert_eq!(select_arch_for(Spec48, Spec128), Spec48);
        assert_eq!(select_arch_for(Spec128, Pentagon), Pentagon);
        assert_eq!(select_arch_for(Spec128, Plus2A), Plus2A);
        assert_eq!(select_arch_for(Spec128, Spec48), Spec128);
        assert_eq!(select_arch_for(Pentagon, Tk95), Pentagon);
        assert_eq!(select_arch_for(Pentagon, Spec128), Spec128);
        assert_eq!(select_arch_for(Plus2A, Spec128), Plus2A);
    }
}
