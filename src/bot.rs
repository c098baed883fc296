use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashSet;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::alert::format_mev_message;
use crate::detector::MevScanner;
use crate::monitor::Monitor;

pub const WELCOME_TEXT: &str = "Welcome! Use /help to see available commands.";
pub const CHECKING_TEXT: &str = "Checking for MEV activity...";
pub const NO_ACTIVITY_TEXT: &str = "No MEV activity detected.";
pub const CHECK_ERROR_TEXT: &str = "An error occurred while checking for MEV activity.";
pub const MONITOR_STARTED_TEXT: &str =
    "Monitoring started. You will be alerted on new MEV activity.";
pub const ALREADY_MONITORING_TEXT: &str = "Already monitoring this chat for MEV activity.";
pub const GENERIC_ERROR_TEXT: &str = "An error occurred. Please try again.";

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show this help message")]
    Help,
    #[command(description = "Check for MEV activity")]
    CheckMev,
    #[command(description = "Alert on new MEV activity as it happens")]
    Monitor,
}

/// The chat operations command handlers need.
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(&self, text: &str) -> Result<()>;

    /// Describes where replies go, for logs.
    fn context(&self) -> String;
}

pub struct ChatReplier {
    bot: Bot,
    chat_id: ChatId,
}

impl ChatReplier {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl Replier for ChatReplier {
    async fn reply(&self, text: &str) -> Result<()> {
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }

    fn context(&self) -> String {
        format!("chat {}", self.chat_id.0)
    }
}

pub struct MevBot {
    scanner: Arc<MevScanner>,
    monitor: Arc<Monitor>,
    /// Reply contexts with a running monitor.
    active_monitors: Arc<DashSet<String>>,
}

impl MevBot {
    pub fn new(scanner: Arc<MevScanner>, monitor: Arc<Monitor>) -> Self {
        Self {
            scanner,
            monitor,
            active_monitors: Arc::new(DashSet::new()),
        }
    }

    /// Dispatches chat commands until the process receives Ctrl-C.
    pub async fn run(self: Arc<Self>, bot: Bot) {
        let handler = Update::filter_message().filter_command::<Command>().endpoint(
            move |bot: Bot, msg: Message, cmd: Command| {
                let this = Arc::clone(&self);
                async move {
                    let replier: Arc<dyn Replier> = Arc::new(ChatReplier::new(bot, msg.chat.id));
                    this.handle_command(cmd, replier).await;
                    respond(())
                }
            },
        );

        Dispatcher::builder(bot, handler)
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    }

    /// Handles one command. Errors are logged and answered, never returned.
    pub async fn handle_command(&self, cmd: Command, replier: Arc<dyn Replier>) {
        tracing::info!("received {cmd:?} from {}", replier.context());

        if let Err(e) = self.dispatch(cmd, Arc::clone(&replier)).await {
            tracing::error!("error handling command from {}: {e:?}", replier.context());
            if let Err(e) = replier.reply(GENERIC_ERROR_TEXT).await {
                tracing::error!("failed to send error reply: {e:?}");
            }
        }
    }

    async fn dispatch(&self, cmd: Command, replier: Arc<dyn Replier>) -> Result<()> {
        match cmd {
            Command::Start => replier.reply(WELCOME_TEXT).await,
            Command::Help => replier.reply(&Command::descriptions().to_string()).await,
            Command::CheckMev => self.check_mev(replier.as_ref()).await,
            Command::Monitor => self.start_monitor(replier).await,
        }
    }

    async fn check_mev(&self, replier: &dyn Replier) -> Result<()> {
        replier.reply(CHECKING_TEXT).await?;

        if let Err(e) = self.report_mev(replier).await {
            tracing::error!("error in check_mev: {e:?}");
            replier.reply(CHECK_ERROR_TEXT).await?;
        }

        Ok(())
    }

    async fn report_mev(&self, replier: &dyn Replier) -> Result<()> {
        let flagged = self.scanner.scan().await;
        if flagged.is_empty() {
            replier.reply(NO_ACTIVITY_TEXT).await
        } else {
            replier.reply(&format_mev_message(&flagged)).await
        }
    }

    async fn start_monitor(&self, replier: Arc<dyn Replier>) -> Result<()> {
        let key = replier.context();
        if !self.active_monitors.insert(key.clone()) {
            return replier.reply(ALREADY_MONITORING_TEXT).await;
        }

        if let Err(e) = replier.reply(MONITOR_STARTED_TEXT).await {
            self.active_monitors.remove(&key);
            return Err(e);
        }

        let monitor = Arc::clone(&self.monitor);
        let active_monitors = Arc::clone(&self.active_monitors);
        tokio::spawn(async move {
            monitor.run(replier.as_ref()).await;
            active_monitors.remove(&key);
        });

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use solana_program::pubkey::Pubkey;
    use tokio::sync::mpsc;

    use super::*;
    use crate::alert::MEV_ALERT_HEADER;
    use crate::fetcher::tests::{record, FailingSource, StaticSource};
    use crate::fetcher::{SignatureSource, TransactionFetcher};
    use crate::models::{LogNotification, TransactionRecord};
    use crate::monitor::tests::ScriptedSubscriber;
    use crate::monitor::{LogSubscriber, MONITOR_ERROR};
    use crate::settings::{Config, DEFAULT_FEE_THRESHOLD};

    /// Records every reply attempt; attempts starting with `fail_prefix` return an error.
    #[derive(Default)]
    pub struct RecordingReplier {
        replies: Mutex<Vec<String>>,
        fail_prefix: Option<&'static str>,
    }

    impl RecordingReplier {
        pub fn failing_on(prefix: &'static str) -> Self {
            Self {
                replies: Mutex::new(Vec::new()),
                fail_prefix: Some(prefix),
            }
        }

        pub fn replies(&self) -> Vec<String> {
            self.replies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Replier for RecordingReplier {
        async fn reply(&self, text: &str) -> Result<()> {
            self.replies.lock().unwrap().push(text.to_string());
            match self.fail_prefix {
                Some(prefix) if text.starts_with(prefix) => anyhow::bail!("message rejected"),
                _ => Ok(()),
            }
        }

        fn context(&self) -> String {
            "test chat".to_string()
        }
    }

    struct NoSubscriber;

    #[async_trait]
    impl LogSubscriber for NoSubscriber {
        async fn subscribe(
            &self,
            _address: &Pubkey,
        ) -> Result<mpsc::Receiver<LogNotification>> {
            anyhow::bail!("no websocket in tests")
        }
    }

    /// Keeps every subscription open until the subscriber is dropped.
    #[derive(Default)]
    struct OpenSubscriber {
        calls: AtomicUsize,
        senders: Mutex<Vec<mpsc::Sender<LogNotification>>>,
    }

    #[async_trait]
    impl LogSubscriber for OpenSubscriber {
        async fn subscribe(&self, _address: &Pubkey) -> Result<mpsc::Receiver<LogNotification>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = mpsc::channel(1);
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }
    }

    fn mev_bot(source: impl SignatureSource + 'static) -> MevBot {
        mev_bot_with_subscriber(source, Arc::new(NoSubscriber))
    }

    fn mev_bot_with_subscriber(
        source: impl SignatureSource + 'static,
        subscriber: Arc<dyn LogSubscriber>,
    ) -> MevBot {
        let mut config = Config::new("test-token").unwrap();
        config.monitor_max_retries = 0;
        config.monitor_backoff_ms = 1;

        let fetcher = TransactionFetcher::new(Arc::new(source), config.token_address);
        let scanner = Arc::new(MevScanner::new(fetcher, DEFAULT_FEE_THRESHOLD));
        let monitor = Arc::new(Monitor::new(
            Arc::clone(&scanner),
            subscriber,
            &config,
        ));
        MevBot::new(scanner, monitor)
    }

    async fn run_command(bot: &MevBot, cmd: Command) -> Vec<String> {
        let replier = Arc::new(RecordingReplier::default());
        bot.handle_command(cmd, replier.clone()).await;
        replier.replies()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "mevbot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/help", "mevbot").unwrap(), Command::Help);
        assert_eq!(Command::parse("/check_mev", "mevbot").unwrap(), Command::CheckMev);
        assert_eq!(Command::parse("/monitor", "mevbot").unwrap(), Command::Monitor);
        assert!(Command::parse("/unknown", "mevbot").is_err());
    }

    #[tokio::test]
    async fn test_start_and_help() {
        let bot = mev_bot(StaticSource(Vec::new()));

        assert_eq!(run_command(&bot, Command::Start).await, vec![WELCOME_TEXT]);

        let help = run_command(&bot, Command::Help).await;
        assert_eq!(help, vec![Command::descriptions().to_string()]);
        for command in ["/start", "/help", "/check_mev", "/monitor"] {
            assert!(help[0].contains(command));
        }
    }

    #[tokio::test]
    async fn test_check_mev_without_activity() {
        let bot = mev_bot(StaticSource(vec![record("quiet", 1_000_000.0)]));
        let replies = run_command(&bot, Command::CheckMev).await;
        assert_eq!(replies, vec![CHECKING_TEXT, NO_ACTIVITY_TEXT]);
    }

    #[tokio::test]
    async fn test_check_mev_with_failing_upstream() {
        let bot = mev_bot(FailingSource);
        let replies = run_command(&bot, Command::CheckMev).await;
        assert_eq!(replies, vec![CHECKING_TEXT, NO_ACTIVITY_TEXT]);
    }

    #[tokio::test]
    async fn test_check_mev_reports_flagged_transactions() {
        let flagged = TransactionRecord {
            signature: Some("abc".to_string()),
            owner: Some("W1".to_string()),
            amount: 5.0,
            block_time: Some(100),
            fee: 1_500_000.0,
        };
        let bot = mev_bot(StaticSource(vec![record("quiet", 10.0), flagged]));

        let replies = run_command(&bot, Command::CheckMev).await;
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], CHECKING_TEXT);
        assert!(replies[1].starts_with(MEV_ALERT_HEADER));
        for expected in ["abc", "W1", "5", "100"] {
            assert!(replies[1].contains(expected));
        }
        assert!(!replies[1].contains("quiet"));
    }

    #[tokio::test]
    async fn test_failed_alert_reply_gets_check_error() {
        let bot = mev_bot(StaticSource(vec![record("hot", 2_000_000.0)]));
        let replier = Arc::new(RecordingReplier::failing_on(MEV_ALERT_HEADER));

        bot.handle_command(Command::CheckMev, replier.clone()).await;

        let replies = replier.replies();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[2], CHECK_ERROR_TEXT);
    }

    #[tokio::test]
    async fn test_handler_error_gets_generic_reply() {
        let bot = mev_bot(StaticSource(Vec::new()));
        let replier = Arc::new(RecordingReplier::failing_on(CHECKING_TEXT));

        bot.handle_command(Command::CheckMev, replier.clone()).await;

        assert_eq!(replier.replies(), vec![CHECKING_TEXT, GENERIC_ERROR_TEXT]);
    }

    #[tokio::test]
    async fn test_monitor_runs_in_background() {
        let bot = mev_bot(StaticSource(Vec::new()));
        let replier = Arc::new(RecordingReplier::default());

        bot.handle_command(Command::Monitor, replier.clone()).await;
        assert_eq!(replier.replies()[0], MONITOR_STARTED_TEXT);

        tokio::time::timeout(Duration::from_secs(5), async {
            while replier.replies().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(replier.replies(), vec![MONITOR_STARTED_TEXT, MONITOR_ERROR]);
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_second_monitor_in_same_chat_is_refused() {
        let subscriber = Arc::new(OpenSubscriber::default());
        let bot = mev_bot_with_subscriber(StaticSource(Vec::new()), subscriber.clone());
        let replier = Arc::new(RecordingReplier::default());

        bot.handle_command(Command::Monitor, replier.clone()).await;
        wait_until(|| subscriber.calls.load(Ordering::SeqCst) == 1).await;

        bot.handle_command(Command::Monitor, replier.clone()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            replier.replies(),
            vec![MONITOR_STARTED_TEXT, ALREADY_MONITORING_TEXT]
        );
    }

    #[tokio::test]
    async fn test_monitor_can_restart_after_it_stops() {
        let subscriber = Arc::new(ScriptedSubscriber::new(Vec::new()));
        let bot = mev_bot_with_subscriber(StaticSource(Vec::new()), subscriber.clone());
        let replier = Arc::new(RecordingReplier::default());

        bot.handle_command(Command::Monitor, replier.clone()).await;
        wait_until(|| bot.active_monitors.is_empty()).await;

        bot.handle_command(Command::Monitor, replier.clone()).await;
        wait_until(|| bot.active_monitors.is_empty()).await;

        assert_eq!(subscriber.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            replier.replies(),
            vec![
                MONITOR_STARTED_TEXT,
                MONITOR_ERROR,
                MONITOR_STARTED_TEXT,
                MONITOR_ERROR
            ]
        );
    }
}
