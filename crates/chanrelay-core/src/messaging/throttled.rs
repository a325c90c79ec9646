use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    config::Config,
    domain::{ChatId, MessageRef},
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per destination chat.
    pub per_chat_min_interval: Duration,
}

impl From<&Config> for ThrottleConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            global_min_interval: cfg.throttle_global_interval,
            per_chat_min_interval: cfg.throttle_per_chat_interval,
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that rate-limits outbound calls.
///
/// Every relayed message lands in the same target chat, so bursts from several
/// sources are spread out here instead of tripping Telegram 429s. Slots are
/// reserved under short locks and the wait happens after they are released.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<i64, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat_id: i64) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let lim = self.limiter_for_chat(chat_id.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(chat_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn copy_message(
        &self,
        source: MessageRef,
        target: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        self.throttle_chat(target).await;
        self.inner.copy_message(source, target, caption).await
    }

    async fn send_sticker(&self, chat_id: ChatId, file_id: &str) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_sticker(chat_id, file_id).await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_text(msg, text).await
    }

    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_caption(msg, caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl MessagingPort for Echo {
        async fn send_text(&self, chat_id: ChatId, _text: &str) -> Result<MessageRef> {
            Ok(MessageRef {
                chat_id,
                message_id: MessageId(1),
            })
        }

        async fn copy_message(
            &self,
            _source: MessageRef,
            target: ChatId,
            _caption: Option<&str>,
        ) -> Result<MessageRef> {
            self.send_text(target, "").await
        }

        async fn send_sticker(&self, chat_id: ChatId, _file_id: &str) -> Result<MessageRef> {
            self.send_text(chat_id, "").await
        }

        async fn edit_text(&self, _msg: MessageRef, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn edit_caption(&self, _msg: MessageRef, _caption: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn limiter_spaces_consecutive_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(100));
        assert_eq!(lim.reserve(), Duration::ZERO);
        let second = lim.reserve();
        assert!(second > Duration::from_millis(50));
        assert!(second <= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn per_chat_calls_are_spaced() {
        let messenger = ThrottledMessenger::new(
            Arc::new(Echo),
            ThrottleConfig {
                global_min_interval: Duration::ZERO,
                per_chat_min_interval: Duration::from_secs(1),
            },
        );

        let start = Instant::now();
        messenger.send_text(ChatId(1), "a").await.unwrap();
        messenger.send_text(ChatId(1), "b").await.unwrap();
        messenger.send_text(ChatId(1), "c").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));

        // A different chat has its own budget.
        let other = Instant::now();
        messenger.send_text(ChatId(2), "x").await.unwrap();
        assert!(other.elapsed() < Duration::from_secs(1));
    }
}
