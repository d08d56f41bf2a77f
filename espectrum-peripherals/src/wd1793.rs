/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! The Beta-disk interface built around the **WD1793** floppy disk controller.
//!
//! Disks are kept in memory as TRD images. Transfers complete without rotational
//! delays: the data request flag is raised as soon as a command starts and every
//! data register access moves one byte.
use core::fmt;
use std::io::{self, Read};

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

pub const TRD_TRACKS: usize = 80;
pub const TRD_SIDES: usize = 2;
pub const TRD_SECTORS: usize = 16;
pub const TRD_SECTOR_SIZE: usize = 256;
pub const TRD_TRACK_SIZE: usize = TRD_SECTORS * TRD_SECTOR_SIZE;
pub const TRD_IMAGE_SIZE: usize = TRD_TRACKS * TRD_SIDES * TRD_TRACK_SIZE;
/// The number of drives selectable with the system register.
pub const NUM_DRIVES: usize = 4;
/// The number of bytes a track write streams in double density.
const RAW_TRACK_SIZE: usize = 6250;
/// How many status reads an index pulse period lasts.
const INDEX_PERIOD: u32 = 16;

bitflags! {
    /// The WD1793 status register.
    ///
    /// The meaning of some bits depends on the type of the last command.
    #[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct Status: u8 {
        const BUSY          = 0b0000_0001;
        /// Type I: index pulse. Other types: data request.
        const INDEX_DRQ     = 0b0000_0010;
        /// Type I: head on track 0. Other types: lost data.
        const TRACK0_LOST   = 0b0000_0100;
        const CRC_ERROR     = 0b0000_1000;
        /// Type I: seek error. Other types: record not found.
        const SEEK_RNF      = 0b0001_0000;
        /// Type I: head loaded. Other types: record type.
        const HEAD_LOADED   = 0b0010_0000;
        const WRITE_PROTECT = 0b0100_0000;
        const NOT_READY     = 0b1000_0000;
    }
}

bitflags! {
    /// Flags written to the Beta-disk system register.
    #[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct SystemFlags: u8 {
        const DRIVE  = 0b0000_0011;
        /// Active low controller reset.
        const RESET  = 0b0000_0100;
        const HLT    = 0b0000_1000;
        /// 0 selects the upper side, 1 the lower one.
        const SIDE   = 0b0001_0000;
        const DENSITY = 0b0100_0000;
    }
}

/// An in-memory TRD disk image.
#[derive(Clone)]
pub struct TrdImage {
    data: Box<[u8]>,
    pub write_protected: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Transfer {
    Idle,
    ReadSector { offset: usize, remaining: usize, multi: bool },
    WriteSector { offset: usize, remaining: usize, multi: bool },
    ReadAddress { pos: usize },
    WriteTrack { remaining: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CommandType {
    TypeI,
    Other
}

/// The WD1793 controller with four attached drives.
#[derive(Clone, Debug)]
pub struct Wd1793 {
    status: Status,
    track: u8,
    sector: u8,
    data: u8,
    command_type: CommandType,
    system: SystemFlags,
    step_in: bool,
    intrq: bool,
    head_track: [u8; NUM_DRIVES],
    id_field: [u8; 6],
    transfer: Transfer,
    index_counter: u32,
    disks: [Option<TrdImage>; NUM_DRIVES],
}

impl fmt::Debug for TrdImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrdImage")
         .field("size", &self.data.len())
         .field("write_protected", &self.write_protected)
         .finish()
    }
}

impl Default for TrdImage {
    fn default() -> Self {
        TrdImage {
            data: vec![0u8; TRD_IMAGE_SIZE].into_boxed_slice(),
            write_protected: false
        }
    }
}

impl TrdImage {
    /// Creates an image from TRD file content.
    ///
    /// Images shorter than 80 tracks on both sides are padded with zeroes.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() > TRD_IMAGE_SIZE || bytes.len() % TRD_SECTOR_SIZE != 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData,
                format!("TRD: invalid image size: {}", bytes.len())))
        }
        let mut image = TrdImage::default();
        image.data[..bytes.len()].copy_from_slice(bytes);
        Ok(image)
    }
    /// Reads a TRD file.
    pub fn read<R: Read>(mut rd: R) -> io::Result<Self> {
        let mut bytes = Vec::with_capacity(TRD_IMAGE_SIZE);
        rd.by_ref().take(TRD_IMAGE_SIZE as u64 + 1).read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
    /// Returns the sector content. `sector` is 1-based as on the disk.
    pub fn sector(&self, track: u8, side: u8, sector: u8) -> Option<&[u8]> {
        let offset = sector_offset(track, side, sector)?;
        Some(&self.data[offset..offset + TRD_SECTOR_SIZE])
    }
}

#[inline]
fn sector_offset(track: u8, side: u8, sector: u8) -> Option<usize> {
    let (track, side, sector) = (track as usize, side as usize, sector as usize);
    if track < TRD_TRACKS && side < TRD_SIDES && (1..=TRD_SECTORS).contains(&sector) {
        Some(((track * TRD_SIDES + side) * TRD_SECTORS + sector - 1) * TRD_SECTOR_SIZE)
    }
    else {
        None
    }
}

impl Default for Wd1793 {
    fn default() -> Self {
        Wd1793 {
            status: Status::empty(),
            track: 0,
            sector: 1,
            data: 0,
            command_type: CommandType::TypeI,
            system: SystemFlags::RESET,
            step_in: true,
            intrq: false,
            head_track: [0; NUM_DRIVES],
            id_field: [0; 6],
            transfer: Transfer::Idle,
            index_counter: 0,
            disks: Default::default(),
        }
    }
}

impl Wd1793 {
    /// Inserts a disk into the `drive`, returning a previously inserted one.
    pub fn insert_disk(&mut self, drive: usize, disk: TrdImage) -> Option<TrdImage> {
        self.disks.get_mut(drive)?.replace(disk)
    }

    pub fn eject_disk(&mut self, drive: usize) -> Option<TrdImage> {
        self.disks.get_mut(drive)?.take()
    }

    pub fn disk(&self, drive: usize) -> Option<&TrdImage> {
        self.disks.get(drive)?.as_ref()
    }

    /// Resets the controller keeping inserted disks.
    pub fn reset(&mut self) {
        let disks = core::mem::take(&mut self.disks);
        *self = Wd1793 { disks, ..Default::default() };
    }

    #[inline]
    pub fn intrq(&self) -> bool {
        self.intrq
    }

    #[inline]
    pub fn drq(&self) -> bool {
        self.command_type == CommandType::Other && self.status.contains(Status::INDEX_DRQ)
    }

    #[inline]
    fn drive(&self) -> usize {
        (self.system & SystemFlags::DRIVE).bits() as usize
    }

    #[inline]
    fn side(&self) -> u8 {
        if self.system.contains(SystemFlags::SIDE) { 0 } else { 1 }
    }

    #[inline]
    fn current_disk(&self) -> Option<&TrdImage> {
        self.disks[self.drive()].as_ref()
    }

    pub fn read_status_reg(&mut self) -> u8 {
        self.intrq = false;
        let mut status = self.status;
        if self.current_disk().is_none() {
            status |= Status::NOT_READY;
        }
        if self.command_type == CommandType::TypeI {
            self.index_counter = self.index_counter.wrapping_add(1);
            let index = self.current_disk().is_some() && self.index_counter % INDEX_PERIOD < 2;
            status.set(Status::INDEX_DRQ, index);
            status.set(Status::TRACK0_LOST, self.head_track[self.drive()] == 0);
        }
        status.bits()
    }

    #[inline]
    pub fn read_track_reg(&self) -> u8 {
        self.track
    }

    #[inline]
    pub fn read_sector_reg(&self) -> u8 {
        self.sector
    }

    /// Reads the data register, streaming the next byte of an active read transfer.
    pub fn read_data_reg(&mut self) -> u8 {
        match self.transfer {
            Transfer::ReadSector { offset, remaining, multi } => {
                if let Some(byte) = self.current_disk().map(|disk| disk.data[offset]) {
                    self.data = byte;
                }
                if remaining > 1 {
                    self.transfer = Transfer::ReadSector { offset: offset + 1, remaining: remaining - 1, multi };
                }
                else if multi {
                    self.sector = self.sector.wrapping_add(1);
                    self.start_sector_transfer(false, true);
                }
                else {
                    self.finish(Status::empty());
                }
            }
            Transfer::ReadAddress { pos } => {
                self.data = self.id_field[pos];
                if pos + 1 < self.id_field.len() {
                    self.transfer = Transfer::ReadAddress { pos: pos + 1 };
                }
                else {
                    self.sector = self.id_field[0];
                    self.finish(Status::empty());
                }
            }
            _ => {}
        }
        self.data
    }

    /// Reads the Beta-disk system register: INTRQ in bit 7 and DRQ in bit 6.
    #[inline]
    pub fn read_system_reg(&self) -> u8 {
        0x3F | if self.intrq { 0x80 } else { 0 } | if self.drq() { 0x40 } else { 0 }
    }

    #[inline]
    pub fn write_track_reg(&mut self, data: u8) {
        if !self.status.contains(Status::BUSY) {
            self.track = data;
        }
    }

    #[inline]
    pub fn write_sector_reg(&mut self, data: u8) {
        if !self.status.contains(Status::BUSY) {
            self.sector = data;
        }
    }

    /// Writes the data register, streaming the byte into an active write transfer.
    pub fn write_data_reg(&mut self, data: u8) {
        self.data = data;
        match self.transfer {
            Transfer::WriteSector { offset, remaining, multi } => {
                let drive = self.drive();
                if let Some(disk) = self.disks[drive].as_mut() {
                    disk.data[offset] = data;
                }
                if remaining > 1 {
                    self.transfer = Transfer::WriteSector { offset: offset + 1, remaining: remaining - 1, multi };
                }
                else if multi {
                    self.sector = self.sector.wrapping_add(1);
                    self.start_sector_transfer(true, true);
                }
                else {
                    self.finish(Status::empty());
                }
            }
            Transfer::WriteTrack { remaining } => {
                if remaining > 1 {
                    self.transfer = Transfer::WriteTrack { remaining: remaining - 1 };
                }
                else {
                    self.format_track();
                    self.finish(Status::empty());
                }
            }
            _ => {}
        }
    }

    /// Writes the Beta-disk system register.
    pub fn write_system_reg(&mut self, data: u8) {
        let flags = SystemFlags::from_bits_truncate(data);
        if !flags.contains(SystemFlags::RESET) {
            debug!("wd1793: controller reset");
            let disks = core::mem::take(&mut self.disks);
            let head_track = self.head_track;
            *self = Wd1793 { disks, head_track, ..Default::default() };
            self.write_command_reg(0x00);
        }
        self.system = flags;
    }

    /// Writes the command register, starting a command.
    pub fn write_command_reg(&mut self, cmd: u8) {
        trace!("wd1793: command 0x{:02x}", cmd);
        if cmd & 0xF0 == 0xD0 {
            self.force_interrupt(cmd);
            return
        }
        if self.status.contains(Status::BUSY) {
            return
        }
        self.intrq = false;
        match cmd >> 4 {
            0x0..=0x7 => self.type_i(cmd),
            0x8|0x9 => {
                self.command_type = CommandType::Other;
                self.start_sector_transfer(false, cmd & 0x10 != 0)
            }
            0xA|0xB => {
                self.command_type = CommandType::Other;
                self.start_sector_transfer(true, cmd & 0x10 != 0)
            }
            0xC => self.read_address(),
            0xE => {
                // read track is not supported on TRD images
                self.command_type = CommandType::Other;
                self.finish(Status::SEEK_RNF);
            }
            _ => self.write_track(),
        }
    }

    fn type_i(&mut self, cmd: u8) {
        self.command_type = CommandType::TypeI;
        self.transfer = Transfer::Idle;
        let drive = self.drive();
        let update_track = cmd & 0x10 != 0;
        match cmd >> 5 {
            0 if cmd & 0x10 == 0 => {
                self.head_track[drive] = 0;
                self.track = 0;
            }
            0 => {
                let target = self.data;
                self.step_in = target > self.track;
                let head = self.head_track[drive] as i16 + target as i16 - self.track as i16;
                self.head_track[drive] = head.max(0).min(TRD_TRACKS as i16 - 1) as u8;
                self.track = target;
            }
            1 => self.step(drive, update_track),
            2 => {
                self.step_in = true;
                self.step(drive, update_track)
            }
            _ => {
                self.step_in = false;
                self.step(drive, update_track)
            }
        }
        let mut status = Status::empty();
        if cmd & 0x08 != 0 {
            status |= Status::HEAD_LOADED;
        }
        if cmd & 0x04 != 0 && (self.current_disk().is_none()
                                || self.track != self.head_track[drive]) {
            status |= Status::SEEK_RNF;
        }
        debug!("wd1793: type I 0x{:02x} drive {} track {}", cmd, drive, self.head_track[drive]);
        self.finish(status);
    }

    fn step(&mut self, drive: usize, update_track: bool) {
        let head = &mut self.head_track[drive];
        if self.step_in {
            if (*head as usize) < TRD_TRACKS - 1 {
                *head += 1;
            }
            if update_track {
                self.track = self.track.wrapping_add(1);
            }
        }
        else {
            *head = head.saturating_sub(1);
            if update_track {
                self.track = self.track.wrapping_sub(1);
            }
        }
    }

    fn start_sector_transfer(&mut self, write: bool, multi: bool) {
        let drive = self.drive();
        let side = self.side();
        let head = self.head_track[drive];
        let disk = match self.disks[drive].as_ref() {
            Some(disk) => disk,
            None => return self.finish(Status::NOT_READY)
        };
        if write && disk.write_protected {
            return self.finish(Status::WRITE_PROTECT)
        }
        if self.track != head {
            return self.finish(Status::SEEK_RNF)
        }
        let offset = match sector_offset(head, side, self.sector) {
            Some(offset) => offset,
            None => return self.finish(Status::SEEK_RNF)
        };
        let remaining = TRD_SECTOR_SIZE;
        self.transfer = if write {
            Transfer::WriteSector { offset, remaining, multi }
        }
        else {
            Transfer::ReadSector { offset, remaining, multi }
        };
        self.status = Status::BUSY|Status::INDEX_DRQ;
    }

    fn read_address(&mut self) {
        self.command_type = CommandType::Other;
        if self.current_disk().is_none() {
            return self.finish(Status::NOT_READY)
        }
        let head = self.head_track[self.drive()];
        self.id_field = [head, self.side(), self.sector.max(1), 1, 0, 0];
        self.transfer = Transfer::ReadAddress { pos: 0 };
        self.status = Status::BUSY|Status::INDEX_DRQ;
    }

    fn write_track(&mut self) {
        self.command_type = CommandType::Other;
        let error = match self.current_disk() {
            None => Some(Status::NOT_READY),
            Some(disk) if disk.write_protected => Some(Status::WRITE_PROTECT),
            _ => None
        };
        if let Some(status) = error {
            return self.finish(status)
        }
        self.transfer = Transfer::WriteTrack { remaining: RAW_TRACK_SIZE };
        self.status = Status::BUSY|Status::INDEX_DRQ;
    }

    fn format_track(&mut self) {
        let drive = self.drive();
        let side = self.side();
        let head = self.head_track[drive];
        if let (Some(disk), Some(offset)) = (self.disks[drive].as_mut(), sector_offset(head, side, 1)) {
            disk.data[offset..offset + TRD_TRACK_SIZE].iter_mut().for_each(|b| *b = 0);
        }
    }

    fn force_interrupt(&mut self, cmd: u8) {
        debug!("wd1793: force interrupt 0x{:02x}", cmd);
        if self.transfer == Transfer::Idle && !self.status.contains(Status::BUSY) {
            self.command_type = CommandType::TypeI;
        }
        self.transfer = Transfer::Idle;
        self.status.remove(Status::BUSY|Status::INDEX_DRQ);
        self.intrq = cmd & 0x0F != 0;
    }

    fn finish(&mut self, status: Status) {
        self.transfer = Transfer::Idle;
        self.status = status;
        self.intrq = true;
    }
}
