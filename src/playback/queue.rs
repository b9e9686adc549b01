/// Track queue for backends without a vendor-side queue
use crate::models::{RepeatMode, Track};

/// Queue for managing playback
#[derive(Debug, Clone, Default)]
pub struct PlaybackQueue {
    /// All tracks in the queue
    pub tracks: Vec<Track>,
    /// Current position in play order
    pub current_index: usize,
    /// Shuffle order: maps play position to queue index. Empty when not shuffled.
    pub shuffle_order: Vec<usize>,
    pub repeat_mode: RepeatMode,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks.extend(tracks);
        if self.is_shuffled() {
            // keep already-played positions, shuffle only the new tail
            self.extend_shuffle_order();
        }
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current_index = 0;
        self.shuffle_order.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_shuffled(&self) -> bool {
        !self.shuffle_order.is_empty()
    }

    /// Map a play position to a queue index
    fn resolve(&self, position: usize) -> Option<usize> {
        if self.is_shuffled() {
            self.shuffle_order
                .get(position)
                .copied()
                .filter(|&idx| idx < self.tracks.len())
        } else {
            (position < self.tracks.len()).then_some(position)
        }
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.resolve(self.current_index)
            .and_then(|idx| self.tracks.get(idx))
    }

    /// Move to the next track in play order; `wrap` restarts at the top
    pub fn next_track(&mut self, wrap: bool) -> Option<&Track> {
        self.validate_shuffle_order();
        if self.tracks.is_empty() {
            return None;
        }
        if self.current_index + 1 < self.tracks.len() {
            self.current_index += 1;
        } else if wrap {
            self.current_index = 0;
        } else {
            return None;
        }
        self.current_track()
    }

    pub fn previous(&mut self) -> Option<&Track> {
        self.validate_shuffle_order();
        if self.current_index > 0 && !self.tracks.is_empty() {
            self.current_index -= 1;
            self.current_track()
        } else {
            None
        }
    }

    /// What plays after the current track finished on its own
    pub fn advance_on_end(&mut self) -> Option<Track> {
        match self.repeat_mode {
            RepeatMode::One => self.current_track().cloned(),
            RepeatMode::All => self.next_track(true).cloned(),
            RepeatMode::Off => self.next_track(false).cloned(),
        }
    }

    /// Point the cursor at `track_id` if it is queued. Returns whether it was found.
    pub fn focus(&mut self, track_id: &str) -> bool {
        let Some(queue_index) = self.tracks.iter().position(|t| t.id == track_id) else {
            return false;
        };
        let position = if self.is_shuffled() {
            self.shuffle_order.iter().position(|&idx| idx == queue_index)
        } else {
            Some(queue_index)
        };
        match position {
            Some(position) => {
                self.current_index = position;
                true
            }
            None => false,
        }
    }

    /// Make `track` current, inserting it right after the cursor when it is not queued
    pub fn focus_or_insert(&mut self, track: &Track) {
        if self.focus(&track.id) {
            return;
        }
        if self.tracks.is_empty() {
            self.shuffle_order.clear();
            self.tracks.push(track.clone());
            self.current_index = 0;
            return;
        }
        let position = (self.current_index + 1).min(self.len());
        if self.is_shuffled() {
            self.tracks.push(track.clone());
            let position = position.min(self.shuffle_order.len());
            self.shuffle_order.insert(position, self.tracks.len() - 1);
            self.current_index = position;
        } else {
            self.tracks.insert(position, track.clone());
            self.current_index = position;
        }
    }

    /// Turn shuffle on or off, keeping the current track current
    pub fn set_shuffle(&mut self, enabled: bool) {
        let current = self.resolve(self.current_index);
        if enabled {
            self.generate_shuffle_order();
            if let Some(idx) = current {
                if let Some(pos) = self.shuffle_order.iter().position(|&i| i == idx) {
                    self.shuffle_order.swap(0, pos);
                }
            }
            self.current_index = 0;
            tracing::info!("Shuffle enabled - generated new shuffle order");
        } else {
            self.shuffle_order.clear();
            self.current_index = current.unwrap_or(0);
            tracing::info!("Shuffle disabled - cleared shuffle order");
        }
    }

    /// Generate a new shuffle order for the current tracks
    pub fn generate_shuffle_order(&mut self) {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        let mut indices: Vec<usize> = (0..self.tracks.len()).collect();
        indices.shuffle(&mut thread_rng());
        self.shuffle_order = indices;
        tracing::debug!("Generated shuffle order: {:?}", self.shuffle_order);
    }

    fn extend_shuffle_order(&mut self) {
        use rand::seq::SliceRandom;
        use rand::thread_rng;

        let known = self.shuffle_order.len();
        let mut added: Vec<usize> = (known..self.tracks.len()).collect();
        added.shuffle(&mut thread_rng());
        self.shuffle_order.extend(added);
    }

    /// Regenerate the shuffle order if it no longer matches the tracks
    fn validate_shuffle_order(&mut self) {
        if self.shuffle_order.is_empty() {
            return;
        }
        let track_count = self.tracks.len();
        let invalid = self.shuffle_order.len() != track_count
            || self.shuffle_order.iter().any(|&idx| idx >= track_count);
        if invalid {
            tracing::warn!(
                "Shuffle order does not match the queue (track count: {}), regenerating",
                track_count
            );
            self.generate_shuffle_order();
            self.current_index = self.current_index.min(track_count.saturating_sub(1));
        }
    }
}
