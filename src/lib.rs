/*
 * Remote CP/M Floppy Controller
 * =============================
 *
 * A remote disk controller for a networked microcomputer emulator: speaks
 * the host's descriptor/command protocol over its I/O+DMA HTTP interface
 * and backs each drive with either a flat CP/M disk image or a native
 * directory synthesized into a CP/M 2.2 disk.
 *
 * Components:
 * ----------
 * - Disk Parameter Block & sector geometry (`dpb`)
 * - Directory extent codec (`extent`)
 * - Directory model (`directory`)
 * - Image backing (`image`)
 * - Directory backing, reader + writer (`dirbacking`)
 * - FIF descriptor protocol (`fif`)
 * - Host bridge (`bridge`)
 * - Callback server (`server`)
 * - Engine (`engine`)
 * - Diskmap configuration (`config`)
 */

pub mod bridge;
pub mod config;
pub mod dirbacking;
pub mod directory;
pub mod dpb;
pub mod engine;
pub mod error;
pub mod extent;
pub mod fif;
pub mod image;
pub mod server;

pub use engine::Engine;
pub use error::{EngineError, Result};
