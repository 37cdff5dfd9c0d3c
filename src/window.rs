//! A fixed-capacity ring buffer of per-state frames.
//!
//! States only move forward. Opening a frame for a newer state evicts every frame `capacity` or
//! more states behind it by overwriting its slot, and an evicted state can never be opened
//! again.

use log::debug;

use crate::error::ContactError;

#[derive(Debug, Clone)]
pub struct StateWindow<T> {
    slots: Vec<Option<(usize, T)>>,
    latest: Option<usize>,
}

impl<T> StateWindow<T> {
    /// Creates a window that retains `capacity` consecutive states (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity.max(1), || None);
        StateWindow {
            slots,
            latest: None,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The newest state a frame was opened for.
    #[must_use]
    pub fn latest(&self) -> Option<usize> {
        self.latest
    }

    #[must_use]
    pub fn is_evicted(&self, state: usize) -> bool {
        self.latest
            .is_some_and(|latest| state + self.capacity() <= latest)
    }

    fn check(&self, state: usize) -> Result<(), ContactError> {
        match self.latest {
            Some(latest) if self.is_evicted(state) => Err(ContactError::EvictedState {
                state,
                oldest_retained: latest + 1 - self.capacity(),
            }),
            _ => Ok(()),
        }
    }

    /// Returns the frame of `state`, creating it with `init` if it does not exist yet. A state
    /// newer than [`latest`](Self::latest) becomes the latest and evicts the states that fall
    /// out of the window.
    pub fn frame_mut(
        &mut self,
        state: usize,
        init: impl FnOnce() -> T,
    ) -> Result<&mut T, ContactError> {
        self.check(state)?;
        if self.latest.is_none_or(|latest| state > latest) {
            self.advance(state);
        }
        let capacity = self.capacity();
        let slot = &mut self.slots[state % capacity];
        if slot.as_ref().is_some_and(|(owner, _)| *owner != state) {
            *slot = None;
        }
        let (_, frame) = slot.get_or_insert_with(|| (state, init()));
        Ok(frame)
    }

    /// Returns the frame of `state` if it was opened and is still retained.
    pub fn frame(&self, state: usize) -> Result<Option<&T>, ContactError> {
        self.check(state)?;
        Ok(self.slots[state % self.capacity()]
            .as_ref()
            .filter(|(owner, _)| *owner == state)
            .map(|(_, frame)| frame))
    }

    fn advance(&mut self, state: usize) {
        let capacity = self.capacity();
        let first = self.latest.map_or(0, |latest| latest + 1);
        // Only the last `capacity` newly reached states can collide with retained frames.
        let first = first.max((state + 1).saturating_sub(capacity));
        for reached in first..=state {
            if let Some((evicted, _)) = self.slots[reached % capacity].take() {
                debug!("evicting state {evicted}");
            }
        }
        self.latest = Some(state);
    }

    /// Drops every frame and forgets the latest state.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.latest = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_created_once() {
        let mut window: StateWindow<Vec<u32>> = StateWindow::new(3);
        window.frame_mut(0, Vec::new).unwrap().push(1);
        window.frame_mut(0, || vec![99]).unwrap().push(2);
        assert_eq!(window.frame(0).unwrap(), Some(&vec![1, 2]));
        assert_eq!(window.frame(1).unwrap(), None);
        assert_eq!(window.latest(), Some(0));
    }

    #[test]
    fn old_states_are_evicted() {
        let mut window: StateWindow<usize> = StateWindow::new(3);
        for state in 0..5 {
            *window.frame_mut(state, || 0).unwrap() = state * 10;
        }
        assert_eq!(window.frame(4).unwrap(), Some(&40));
        assert_eq!(window.frame(2).unwrap(), Some(&20));
        assert!(window.is_evicted(1));
        assert!(matches!(
            window.frame(1),
            Err(ContactError::EvictedState {
                state: 1,
                oldest_retained: 2
            })
        ));
        assert!(window.frame_mut(0, || 0).is_err());
    }

    #[test]
    fn skipped_states_clear_their_slots() {
        let mut window: StateWindow<usize> = StateWindow::new(4);
        *window.frame_mut(1, || 0).unwrap() = 1;
        *window.frame_mut(2, || 0).unwrap() = 2;
        // Jumping ahead past the whole window leaves nothing behind.
        window.frame_mut(20, || 20).unwrap();
        assert_eq!(window.frame(17).unwrap(), None);
        assert_eq!(window.frame(20).unwrap(), Some(&20));
        assert!(window.is_evicted(2));

        // Older, unvisited states inside the window can still be opened.
        assert_eq!(*window.frame_mut(18, || 18).unwrap(), 18);
        assert_eq!(window.latest(), Some(20));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut window: StateWindow<usize> = StateWindow::new(2);
        window.frame_mut(10, || 1).unwrap();
        window.clear();
        assert_eq!(window.latest(), None);
        assert_eq!(window.frame(0).unwrap(), None);
        assert_eq!(*window.frame_mut(0, || 5).unwrap(), 5);
    }
}
