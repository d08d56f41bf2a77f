/*
    Copyright (C) 2024  The ESPECTRUM developers

    This file is part of ESPECTRUM, a cycle-accurate ZX Spectrum emulation core.

    For the full copyright notice, see the lib.rs file.
*/
//! Real tape signal capture.
//!
//! An interrupt-driven sampler pushes the EAR line level into a lock-free ring with
//! a [RealTapeSink]. The emulation thread reads levels back with [RealTape], mapping
//! frame T-states to sample positions.
//!
//! The ring holds two frames worth of samples. The writer starts one frame ahead
//! of the reader, so the reader never overtakes it as long as both run at the
//! nominal rate.
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

#[allow(unused_imports)]
use log::{error, warn, info, debug, trace};

#[derive(Debug)]
struct Ring {
    enabled: AtomicBool,
    index: AtomicUsize,
    buf: Box<[AtomicU8]>,
}

/// The writer side of the capture ring, owned by the sampling interrupt handler.
#[derive(Clone, Debug)]
pub struct RealTapeSink {
    ring: Arc<Ring>,
}

/// The reader side of the capture ring, owned by the emulation thread.
#[derive(Debug)]
pub struct RealTape {
    ring: Arc<Ring>,
    samples_per_frame: usize,
    factor: f64,
    base: u64,
    basepos: u64,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Ring {
            enabled: AtomicBool::new(false),
            index: AtomicUsize::new(0),
            buf: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
        }
    }
}

impl RealTapeSink {
    /// Stores one sample if capture is enabled. Never blocks.
    #[inline]
    pub fn push(&self, level: bool) {
        let ring = &*self.ring;
        if ring.enabled.load(Ordering::Acquire) {
            let index = ring.index.load(Ordering::Relaxed);
            if let Some(slot) = ring.buf.get(index) {
                slot.store(level as u8, Ordering::Relaxed);
            }
            let next = index + 1;
            ring.index.store(if next >= ring.buf.len() { 0 } else { next }, Ordering::Release);
        }
    }
}

impl RealTape {
    /// Creates a ring for `samples_per_frame` samples captured during `tstates_per_frame` T-states.
    pub fn new(samples_per_frame: usize, tstates_per_frame: u32) -> Self {
        let samples_per_frame = samples_per_frame.max(1);
        RealTape {
            ring: Arc::new(Ring::new(2 * samples_per_frame)),
            samples_per_frame,
            factor: samples_per_frame as f64 / tstates_per_frame.max(1) as f64,
            base: 0,
            basepos: 0,
        }
    }
    /// Returns a writer handle sharing this ring.
    pub fn sink(&self) -> RealTapeSink {
        RealTapeSink { ring: Arc::clone(&self.ring) }
    }
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.ring.enabled.load(Ordering::Acquire)
    }
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.buf.len()
    }
    /// Enables capture, anchoring sample positions at `global_tstates`.
    pub fn start(&mut self, global_tstates: u64) {
        if !self.is_enabled() {
            self.base = global_tstates;
            self.basepos = 0;
            self.ring.index.store(self.samples_per_frame, Ordering::Relaxed);
            self.ring.enabled.store(true, Ordering::Release);
            debug!("real tape: capture started at {}", global_tstates);
        }
    }
    pub fn pause(&mut self) {
        self.ring.enabled.store(false, Ordering::Release);
    }
    /// Replaces the ring with one sized for the new frame geometry.
    ///
    /// Sinks created before this call are detached. Returns a sink for the new ring.
    pub fn realloc(&mut self, samples_per_frame: usize, tstates_per_frame: u32) -> RealTapeSink {
        let was_enabled = self.is_enabled();
        let base = self.base;
        self.pause();
        *self = RealTape::new(samples_per_frame, tstates_per_frame);
        if was_enabled {
            self.start(base);
        }
        self.sink()
    }
    /// Recomputes the frame base position, must be called once per frame.
    #[inline]
    pub fn prepare_frame(&mut self, global_tstates: u64) {
        self.basepos = global_tstates.wrapping_sub(self.base);
    }
    /// Returns the EAR level captured at the frame T-state `tstates`.
    #[inline]
    pub fn level(&self, tstates: u32) -> bool {
        let pos = ((self.basepos + tstates as u64) as f64 * self.factor) as usize;
        let buf = &self.ring.buf;
        buf[pos % buf.len()].load(Ordering::Relaxed) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn realtape_ring_works() {
        let mut tape = RealTape::new(4, 400);
        assert_eq!(tape.capacity(), 8);
        let sink = tape.sink();
        sink.push(true);
        assert!(!tape.level(0));
        tape.start(1000);
        assert!(tape.is_enabled());
        // the writer starts one frame ahead
        for _ in 0..4 {
            sink.push(false);
        }
        for _ in 0..4 {
            sink.push(true);
        }
        tape.prepare_frame(1000);
        assert!(tape.level(0));
        assert!(tape.level(399));
        tape.prepare_frame(1400);
        assert!(!tape.level(0));
        assert!(!tape.level(399));
        tape.pause();
        sink.push(true);
        assert!(!tape.level(0));
    }

    #[test]
    fn realtape_sink_works_across_threads() {
        let mut tape = RealTape::new(64, 6400);
        tape.start(0);
        let sink = tape.sink();
        thread::spawn(move || {
            for _ in 0..128 {
                sink.push(true);
            }
        }).join().unwrap();
        tape.prepare_frame(0);
        assert!((0..12800).all(|ts| tape.level(ts)));
    }

    #[test]
    fn realtape_realloc_detaches_old_sink() {
        let mut tape = RealTape::new(4, 400);
        tape.start(0);
        let old = tape.sink();
        let sink = tape.realloc(8, 800);
        assert!(tape.is_enabled());
        assert_eq!(tape.capacity(), 16);
        for _ in 0..16 {
            old.push(true);
        }
        tape.prepare_frame(0);
        assert!(!(0..1600).any(|ts| tape.level(ts)));
        for _ in 0..16 {
            sink.push(true);
        }
        assert!((0..1600).all(|ts| tape.level(ts)));
    }
}
