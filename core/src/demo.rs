/// Demo generator: synthetic gaming-stream chat
use crate::classifier::replace_first_mention;
use crate::config::Config;
use crate::error::Result;
use crate::message::{now_millis, Message, MessageType};
use crate::service::{FlowHandle, StreamStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

const DEMO_AUTHORS: [&str; 10] = [
    "Alex", "Sam", "Jordan", "Casey", "Morgan", "Taylor", "Riley", "Drew", "Jamie", "Quinn",
];

const DEMO_TEMPLATES: [(&str, &str); 15] = [
    ("This stream is fire! 🔥", "direct"),
    ("@Alex totally agree!", "thread"),
    ("What game is this?", "direct"),
    ("@Jordan It's the new release", "thread"),
    ("CHECK OUT MY CHANNEL", "spam"),
    ("Anyone else lagging?", "direct"),
    ("@Sam yeah same here", "thread"),
    ("Love the energy!", "direct"),
    ("Can we get 1000 likes?", "direct"),
    ("@Casey that move was insane", "thread"),
    ("First time here, loving it", "direct"),
    ("@Riley welcome!", "thread"),
    ("What settings are you using?", "direct"),
    ("@Drew I think 1080p60", "thread"),
    ("POG moment right there", "direct"),
];

pub struct DemoGenerator {
    index: usize,
    min_interval: Duration,
    jitter: Duration,
    rng: StdRng,
}

impl DemoGenerator {
    pub fn new(min_interval: Duration, jitter: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            index: 0,
            min_interval,
            jitter,
            rng,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.demo_min_interval, config.demo_jitter, config.seed)
    }

    fn random_author(&mut self) -> &'static str {
        DEMO_AUTHORS[self.rng.gen_range(0..DEMO_AUTHORS.len())]
    }

    /// Next message in template order, with a random author and mention
    pub fn next_message(&mut self) -> Message {
        let (text, kind) = DEMO_TEMPLATES[self.index % DEMO_TEMPLATES.len()];
        self.index += 1;

        let author = self.random_author();
        let mentioned = self.random_author();
        let now = now_millis();
        let id = format!("{}-{}", now, self.rng.gen::<f64>());

        Message::new(author, replace_first_mention(text, mentioned), MessageType::from(kind))
            .with_id(id)
            .with_timestamp(now)
    }

    /// Pause before the next message
    pub fn next_delay(&mut self) -> Duration {
        self.min_interval + self.jitter.mul_f64(self.rng.gen::<f64>())
    }

    /// Switch the status banner to demo mode and start producing messages.
    ///
    /// The banner shown before the demo comes back once the demo is stopped.
    pub fn start(mut self, handle: FlowHandle) -> Result<DemoHandle> {
        let previous = handle.snapshot().status.clone();
        handle.set_status(StreamStatus::demo())?;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!("Demo generator started");
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                if handle.push(self.next_message()).is_err() {
                    debug!("Ingest task gone, demo generator exiting");
                    return;
                }

                let delay = self.next_delay();
                tokio::select! {
                    _ = sleep(delay) => {}
                    // Fires on stop and when the handle is dropped
                    _ = stop_rx.changed() => break,
                }
            }
            if handle.set_status(previous).is_err() {
                debug!("Ingest task gone before the status could be restored");
            }
            info!("Demo generator stopped");
        });

        Ok(DemoHandle { stop_tx, task })
    }
}

/// Control for a running demo. Dropping it stops the demo.
pub struct DemoHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DemoHandle {
    /// Signal the generator to stop without waiting for it
    pub fn cancel(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop the generator and wait until it has exited
    pub async fn stop(self) {
        self.cancel();
        let _ = self.task.await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
