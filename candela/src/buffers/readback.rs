use log::debug;

use crate::{Buffer, Device, Result, StorageBuffer};

/// Number of frames between copying data into the ring and reading it back.
pub const READBACK_FRAMES: usize = 3;

/// Ring of buffers that lets the host look at device data without waiting
/// for the frame that produced it: each frame's data is copied into the
/// ring and read back `READBACK_FRAMES` frames later.
#[derive(Debug)]
pub struct Readback {
    slots: Vec<StorageBuffer>,
    filled: [Option<u32>; READBACK_FRAMES],
    last_frame: Option<u32>,
    latest: Option<Vec<u32>>,
}

impl Readback {
    pub fn new(
        device: &Device,
        label: impl AsRef<str>,
        len: usize,
    ) -> Result<Self> {
        let label = label.as_ref();

        let slots = (0..READBACK_FRAMES)
            .map(|slot| {
                StorageBuffer::new(device, format!("{label}_readback{slot}"), len)
            })
            .collect::<Result<_>>()?;

        Ok(Self {
            slots,
            filled: Default::default(),
            last_frame: None,
            latest: None,
        })
    }

    /// Copies `src` into the ring and returns the data copied
    /// `READBACK_FRAMES` frames ago, if there's any.
    ///
    /// Calling this function more than once per frame is a no-op that
    /// returns the same data again.
    pub fn push(
        &mut self,
        device: &Device,
        frame: u32,
        src: &StorageBuffer,
    ) -> Option<&[u32]> {
        if self.last_frame == Some(frame) {
            return self.latest.as_deref();
        }

        let slot = frame as usize % READBACK_FRAMES;

        if let Some(filled_at) = self.filled[slot] {
            if frame.wrapping_sub(filled_at) as usize == READBACK_FRAMES {
                self.latest = Some(self.slots[slot].to_vec());
            }
        }

        device.copy(src, &self.slots[slot]);

        self.filled[slot] = Some(frame);
        self.last_frame = Some(frame);
        self.latest.as_deref()
    }

    /// Forgets everything the ring has seen so far.
    pub fn reset(&mut self) {
        debug!("Resetting readback `{}`", self.slots[0].label());

        self.filled = Default::default();
        self.last_frame = None;
        self.latest = None;
    }

    pub fn bytes(&self) -> usize {
        self.slots.iter().map(|slot| slot.bytes()).sum()
    }
}
