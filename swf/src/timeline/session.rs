use std::collections::BTreeMap;

use serde::Serialize;

/// One instantiation slot minted by a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Symbol the slot was minted for.
    pub symbol_id: u16,
    pub instance_name: Option<String>,
    /// The slot is a container wrapping a graphics-only symbol.
    pub container: bool,
}

/// Result of [`SessionAllocator::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub session_id: u32,
    /// The id was taken from a free list rather than minted.
    pub reused: bool,
    /// The reused slot carried a different name; the caller must stage a
    /// name update with the new value.
    pub rename: Option<Option<String>>,
}

type FreeKey = (u16, Option<String>);

/// Hands out session ids and recycles them by `(symbol, name)`.
///
/// An exact `(symbol, name)` match is reused first. Failing that, a named
/// placement takes an unnamed free slot of the symbol; a slot filed under
/// another name stays reserved for that name. An unnamed placement falls
/// back to any free slot of the symbol. Otherwise a new id is minted.
#[derive(Debug, Default)]
pub struct SessionAllocator {
    sessions: Vec<SessionInfo>,
    /// Symbol and name each session currently holds.
    current: Vec<FreeKey>,
    free: BTreeMap<FreeKey, Vec<u32>>,
}

impl SessionAllocator {
    pub fn acquire(&mut self, symbol_id: u16, name: Option<&str>, container: bool) -> Acquired {
        let key = (symbol_id, name.map(str::to_string));
        if let Some(session_id) = self.pop(&key) {
            return Acquired {
                session_id,
                reused: true,
                rename: None,
            };
        }

        let fallback = match name {
            Some(_) => self.pop(&(symbol_id, None)),
            None => self
                .free
                .range((symbol_id, None)..)
                .take_while(|((symbol, _), _)| *symbol == symbol_id)
                .find(|(_, ids)| !ids.is_empty())
                .map(|(key, _)| key.clone())
                .and_then(|key| self.pop(&key)),
        };
        if let Some(session_id) = fallback {
            self.current[session_id as usize].1 = key.1.clone();
            return Acquired {
                session_id,
                reused: true,
                rename: Some(key.1),
            };
        }

        let session_id = self.sessions.len() as u32;
        self.sessions.push(SessionInfo {
            symbol_id,
            instance_name: key.1.clone(),
            container,
        });
        self.current.push(key);
        Acquired {
            session_id,
            reused: false,
            rename: None,
        }
    }

    /// Return a session to the free list under the symbol and name it
    /// holds now.
    pub fn release(&mut self, session_id: u32) {
        if let Some(key) = self.current.get(session_id as usize) {
            self.free.entry(key.clone()).or_default().push(session_id);
        }
    }

    /// Record that a live session was renamed.
    pub fn rename(&mut self, session_id: u32, name: Option<String>) {
        if let Some(key) = self.current.get_mut(session_id as usize) {
            key.1 = name;
        }
    }

    /// Record that a live container session now shows another symbol.
    pub fn swap_symbol(&mut self, session_id: u32, symbol_id: u16) {
        if let Some(key) = self.current.get_mut(session_id as usize) {
            key.0 = symbol_id;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn into_sessions(self) -> Vec<SessionInfo> {
        self.sessions
    }

    fn pop(&mut self, key: &FreeKey) -> Option<u32> {
        let ids = self.free.get_mut(key)?;
        let id = ids.pop();
        if ids.is_empty() {
            self.free.remove(key);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_reuses_slot() {
        let mut sessions = SessionAllocator::default();
        let first = sessions.acquire(10, Some("x"), false);
        sessions.release(first.session_id);
        let second = sessions.acquire(10, Some("x"), false);
        assert_eq!(second.session_id, first.session_id);
        assert!(second.reused);
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn test_other_name_mints_new_slot() {
        let mut sessions = SessionAllocator::default();
        let first = sessions.acquire(10, Some("x"), false);
        sessions.release(first.session_id);
        let second = sessions.acquire(10, Some("y"), false);
        assert_ne!(second.session_id, first.session_id);
        assert!(!second.reused);

        // The first slot is still free for its own name.
        let third = sessions.acquire(10, Some("x"), false);
        assert_eq!(third.session_id, first.session_id);
    }

    #[test]
    fn test_named_takes_unnamed_slot() {
        let mut sessions = SessionAllocator::default();
        let unnamed = sessions.acquire(10, None, false);
        sessions.release(unnamed.session_id);

        let named = sessions.acquire(10, Some("y"), false);
        assert_eq!(named.session_id, unnamed.session_id);
        assert!(named.reused);
        assert_eq!(named.rename, Some(Some("y".to_string())));
        assert_eq!(sessions.len(), 1);

        // filed under its new name once released
        sessions.release(named.session_id);
        assert!(sessions.acquire(10, Some("y"), false).reused);
    }

    #[test]
    fn test_named_skips_unnamed_slot_of_other_symbol() {
        let mut sessions = SessionAllocator::default();
        let other = sessions.acquire(11, None, false);
        sessions.release(other.session_id);
        assert!(!sessions.acquire(10, Some("y"), false).reused);
    }

    #[test]
    fn test_unnamed_falls_back_to_any_slot_of_symbol() {
        let mut sessions = SessionAllocator::default();
        let named = sessions.acquire(10, Some("x"), false);
        let other = sessions.acquire(11, None, false);
        sessions.release(named.session_id);
        sessions.release(other.session_id);

        let unnamed = sessions.acquire(10, None, false);
        assert_eq!(unnamed.session_id, named.session_id);
        assert_eq!(unnamed.rename, Some(None));

        // Released again, it is now filed as unnamed.
        sessions.release(unnamed.session_id);
        assert!(!sessions.acquire(10, Some("x"), false).reused);
    }

    #[test]
    fn test_unnamed_prefers_unnamed_slot() {
        let mut sessions = SessionAllocator::default();
        let named = sessions.acquire(10, Some("x"), false);
        let unnamed = sessions.acquire(10, None, false);
        sessions.release(named.session_id);
        sessions.release(unnamed.session_id);
        let again = sessions.acquire(10, None, false);
        assert_eq!(again.session_id, unnamed.session_id);
        assert_eq!(again.rename, None);
    }

    #[test]
    fn test_swapped_container_is_filed_under_new_symbol() {
        let mut sessions = SessionAllocator::default();
        let slot = sessions.acquire(1, None, true);
        sessions.swap_symbol(slot.session_id, 2);
        sessions.release(slot.session_id);
        assert!(!sessions.acquire(1, None, true).reused);
        assert_eq!(sessions.acquire(2, None, true).session_id, slot.session_id);
    }
}
