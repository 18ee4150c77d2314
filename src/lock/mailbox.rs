//! Single-slot mailbox for deep links that arrive before launch completes

use tracing::{debug, info};

use crate::deeplink::DeepLink;

/// Holds at most one deep link until the daemon has finished launching
#[derive(Debug, Default)]
pub struct Mailbox {
    launched: bool,
    pending: Option<DeepLink>,
}

impl Mailbox {
    /// Whether launch has completed
    pub fn is_open(&self) -> bool {
        self.launched
    }

    /// Accept a link; returns it back when it should be applied right away
    pub fn deliver(&mut self, link: DeepLink) -> Option<DeepLink> {
        if self.launched {
            return Some(link);
        }

        if let Some(previous) = self.pending.replace(link) {
            info!(?previous, ?link, "pending deep link replaced");
        } else {
            debug!(?link, "deep link queued until launch completes");
        }
        None
    }

    /// Mark launch complete and hand out the queued link, once
    pub fn open(&mut self) -> Option<DeepLink> {
        self.launched = true;
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deeplink::LinkCommand;

    fn link(command: LinkCommand, target: Option<bool>) -> DeepLink {
        DeepLink { command, target }
    }

    #[test]
    fn test_queues_until_open() {
        let mut mailbox = Mailbox::default();
        let first = link(LinkCommand::ToggleLock, Some(true));

        assert_eq!(mailbox.deliver(first), None);
        assert!(!mailbox.is_open());
        assert_eq!(mailbox.open(), Some(first));
        assert_eq!(mailbox.open(), None);
    }

    #[test]
    fn test_last_write_wins() {
        let mut mailbox = Mailbox::default();
        let first = link(LinkCommand::ToggleLock, Some(true));
        let second = link(LinkCommand::ToggleKeyboardLock, Some(false));

        mailbox.deliver(first);
        mailbox.deliver(second);
        assert_eq!(mailbox.open(), Some(second));
    }

    #[test]
    fn test_passes_through_after_open() {
        let mut mailbox = Mailbox::default();
        mailbox.open();

        let live = link(LinkCommand::ToggleKeyboardLock, None);
        assert_eq!(mailbox.deliver(live), Some(live));
        assert_eq!(mailbox.open(), None);
    }
}
