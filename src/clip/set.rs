use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::id::ClipVolumeId;

use super::volume::ClipVolume;

/// Fingerprint of a [`ClipVolumeSet`]'s membership.
///
/// Compiled programs are sized for a particular number of clip volumes, so a
/// renderer compares this against the hash it compiled with before every draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructuralHash(u64);

/// The scene-wide, ordered collection of clip volumes.
///
/// Order is significant: the volume at position `i` feeds uniform slot `i` of
/// every compiled program. Membership changes (add/remove) change
/// [`hash`](Self::hash); mutating a member through [`get_mut`](Self::get_mut)
/// never does.
#[derive(Debug)]
pub struct ClipVolumeSet {
    volumes: Vec<(ClipVolumeId, ClipVolume)>,
    next_id: u64,
    hash: StructuralHash,
}

impl ClipVolumeSet {
    pub fn new() -> Self {
        let mut set = Self {
            volumes: Vec::new(),
            next_id: 0,
            hash: StructuralHash(0),
        };
        set.rehash();
        set
    }

    /// Registers a volume at the end of the sequence.
    pub fn add(&mut self, volume: ClipVolume) -> ClipVolumeId {
        let id = ClipVolumeId(self.next_id);
        self.next_id += 1;
        self.volumes.push((id, volume));
        self.rehash();
        tracing::debug!(%id, count = self.volumes.len(), "clip volume added");
        id
    }

    /// Deregisters and returns a volume. Removing a non-member is a no-op.
    pub fn remove(&mut self, id: ClipVolumeId) -> Option<ClipVolume> {
        let index = self.volumes.iter().position(|(member, _)| *member == id)?;
        let (_, volume) = self.volumes.remove(index);
        self.rehash();
        tracing::debug!(%id, count = self.volumes.len(), "clip volume removed");
        Some(volume)
    }

    pub fn hash(&self) -> StructuralHash {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn contains(&self, id: ClipVolumeId) -> bool {
        self.volumes.iter().any(|(member, _)| *member == id)
    }

    pub fn get(&self, id: ClipVolumeId) -> Option<&ClipVolume> {
        self.volumes
            .iter()
            .find(|(member, _)| *member == id)
            .map(|(_, volume)| volume)
    }

    pub fn get_mut(&mut self, id: ClipVolumeId) -> Option<&mut ClipVolume> {
        self.volumes
            .iter_mut()
            .find(|(member, _)| *member == id)
            .map(|(_, volume)| volume)
    }

    /// Members in uniform-slot order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (ClipVolumeId, &ClipVolume)> {
        self.volumes.iter().map(|(id, volume)| (*id, volume))
    }

    pub fn active_count(&self) -> usize {
        self.volumes
            .iter()
            .filter(|(_, volume)| volume.is_active())
            .count()
    }

    fn rehash(&mut self) {
        let mut hasher = DefaultHasher::new();
        self.volumes.len().hash(&mut hasher);
        for (id, _) in &self.volumes {
            id.hash(&mut hasher);
        }
        self.hash = StructuralHash(hasher.finish());
    }
}

impl Default for ClipVolumeSet {
    fn default() -> Self {
        Self::new()
    }
}
