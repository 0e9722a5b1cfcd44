use std::sync::Arc;
use tokio::sync::watch;

/// One-shot interrupt flag shared by clones. Long runs poll `is_notified`
/// between keys, so an interrupt takes effect at a key boundary.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Notifier {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn is_notified(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Raise the flag for every clone. Raising it twice is a no-op.
    pub fn notify_all(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier::new()
    }
}
