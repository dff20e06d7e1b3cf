/// Lifecycle of one streamed entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    #[default]
    Pending,
    Active,
    Complete,
    Errored,
}

impl BufferStatus {
    /// `Complete` and `Errored` accept no further mutation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }
}

/// Growing text and metadata for one streamed entity (a chat message or one
/// advisor's opinion).
///
/// `text` is append-only and every mutator is a no-op once the buffer is
/// terminal. Mutators return `true` when they changed the buffer.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AccumulationBuffer<K, M> {
    pub key: K,
    pub text: String,
    pub status: BufferStatus,
    pub metadata: Option<M>,
}

impl<K, M> AccumulationBuffer<K, M> {
    pub fn new(key: K) -> Self {
        Self {
            key,
            text: String::new(),
            status: BufferStatus::Pending,
            metadata: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Pending -> Active`. Already-active buffers stay active.
    pub fn activate(&mut self) -> bool {
        match self.status {
            BufferStatus::Pending => {
                self.status = BufferStatus::Active;
                true
            }
            BufferStatus::Active => true,
            BufferStatus::Complete | BufferStatus::Errored => false,
        }
    }

    /// Appends a fragment, activating a pending buffer on the way.
    pub fn append(&mut self, fragment: &str) -> bool {
        if !self.activate() {
            return false;
        }
        self.text.push_str(fragment);
        true
    }

    /// Sets metadata once; later calls keep the first value.
    pub fn attach_metadata(&mut self, metadata: M) -> bool {
        if self.is_terminal() || self.metadata.is_some() {
            return false;
        }
        self.metadata = Some(metadata);
        true
    }

    pub fn complete(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = BufferStatus::Complete;
        true
    }

    pub fn fail(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = BufferStatus::Errored;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Buf = AccumulationBuffer<&'static str, u32>;

    #[test]
    fn append_activates_and_concatenates() {
        let mut buf = Buf::new("a");
        assert_eq!(buf.status, BufferStatus::Pending);
        assert!(buf.append("Il "));
        assert!(buf.append("semble"));
        assert_eq!(buf.status, BufferStatus::Active);
        assert_eq!(buf.text, "Il semble");
    }

    #[test]
    fn terminal_buffer_rejects_every_mutation() {
        let mut buf = Buf::new("a");
        buf.append("x");
        assert!(buf.complete());
        let before = buf.clone();
        assert!(!buf.append("y"));
        assert!(!buf.activate());
        assert!(!buf.attach_metadata(7));
        assert!(!buf.fail());
        assert!(!buf.complete());
        assert_eq!(buf, before);
    }

    #[test]
    fn metadata_is_set_once() {
        let mut buf = Buf::new("a");
        assert!(buf.attach_metadata(1));
        assert!(!buf.attach_metadata(2));
        assert_eq!(buf.metadata, Some(1));
    }

    #[test]
    fn fail_from_pending_is_terminal() {
        let mut buf = Buf::new("a");
        assert!(buf.fail());
        assert!(buf.status.is_terminal());
        assert!(!buf.append("late"));
        assert!(buf.text.is_empty());
    }
}
