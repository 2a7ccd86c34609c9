//! Fire-and-forget fan-out of application events

use courier_core::{create_app_event_channel, AppEvent, AppEventReceiver, AppEventSender, ChannelConfig};

/// Broadcast bus shared by the supervisor and the dispatcher
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped, and slow subscribers observe `Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: AppEventSender,
}

impl EventBus {
    pub fn new(config: &ChannelConfig) -> Self {
        let (sender, _receiver) = create_app_event_channel(config);
        Self { sender }
    }

    pub fn publish(&self, event: AppEvent) {
        tracing::trace!(?event, "Publishing app event");
        let _ = self.sender.send(event);
    }

    pub fn status<T: Into<String>>(&self, text: T) {
        self.publish(AppEvent::status(text));
    }

    pub fn subscribe(&self) -> AppEventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
