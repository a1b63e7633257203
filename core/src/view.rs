/// Presentation models read by renderers
///
/// Everything here is derived from an [`Aggregator`] on demand and carries no
/// state of its own.
use crate::aggregator::{Aggregator, Thread};
use crate::message::{Message, MessageType};
use chrono::{Local, TimeZone};
use rand::Rng;
use serde::Serialize;
use std::f64::consts::PI;

/// Feed entries show at most this many characters of text
pub const FEED_TEXT_LIMIT: usize = 100;

/// Participants named explicitly before collapsing into "+N"
const PARTICIPANTS_SHOWN: usize = 3;

/// Headline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub threads: usize,
    pub direct: usize,
    pub spam: usize,
}

impl DashboardStats {
    pub fn from_aggregator(agg: &Aggregator) -> Self {
        Self {
            total: agg.total_count(),
            threads: agg.thread_count(),
            direct: agg.direct_count(),
            spam: agg.spam_count(),
        }
    }
}

/// "@a, @b, @c" for the first three participants
fn mention_list(participants: &[String]) -> String {
    participants
        .iter()
        .take(PARTICIPANTS_SHOWN)
        .map(|p| format!("@{}", p))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summary row for the threads panel
#[derive(Debug, Clone, Serialize)]
pub struct ThreadCard {
    pub id: String,
    pub kind: MessageType,
    pub label: String,
    pub message_count: usize,
    pub participants: String,
    pub preview: String,
    pub last_activity: i64,
}

impl ThreadCard {
    pub fn from_thread(thread: &Thread) -> Self {
        let mut participants = mention_list(&thread.participants);
        if thread.participants.len() > PARTICIPANTS_SHOWN {
            participants.push_str(&format!(
                " +{}",
                thread.participants.len() - PARTICIPANTS_SHOWN
            ));
        }

        Self {
            id: thread.id.clone(),
            kind: thread.kind.clone(),
            label: thread.kind.as_str().to_uppercase(),
            message_count: thread.messages.len(),
            participants,
            preview: thread
                .last_message()
                .map(|m| m.text.clone())
                .unwrap_or_default(),
            last_activity: thread.last_activity,
        }
    }
}

/// Cards for every non-spam thread, most recent first
pub fn thread_cards(agg: &Aggregator) -> Vec<ThreadCard> {
    agg.sorted_threads()
        .into_iter()
        .map(ThreadCard::from_thread)
        .collect()
}

/// One line of the live feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    pub author: String,
    pub text: String,
    pub kind: MessageType,
}

impl FeedEntry {
    pub fn from_message(msg: &Message) -> Self {
        Self {
            author: msg.author.clone(),
            text: msg.text.chars().take(FEED_TEXT_LIMIT).collect(),
            kind: msg.kind.clone(),
        }
    }
}

pub fn live_feed(agg: &Aggregator, limit: usize) -> Vec<FeedEntry> {
    agg.recent_feed(limit)
        .into_iter()
        .map(FeedEntry::from_message)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomEntry {
    pub author: String,
    pub text: String,
    pub time: String,
    pub is_reply: bool,
}

/// Full history of one thread
#[derive(Debug, Clone, Serialize)]
pub struct RoomView {
    pub thread_id: String,
    pub title: String,
    pub entries: Vec<RoomEntry>,
}

impl RoomView {
    pub fn from_thread(thread: &Thread) -> Self {
        let entries = thread
            .messages
            .iter()
            .enumerate()
            .map(|(i, msg)| RoomEntry {
                author: msg.author.clone(),
                text: msg.text.clone(),
                time: local_time(msg.timestamp),
                is_reply: msg.text.starts_with('@') || i > 0,
            })
            .collect();

        Self {
            thread_id: thread.id.clone(),
            title: format!("Conversation: {}", mention_list(&thread.participants)),
            entries,
        }
    }
}

/// Room for `thread_id`, `None` when the thread does not exist
pub fn room(agg: &Aggregator, thread_id: &str) -> Option<RoomView> {
    agg.thread(thread_id).map(RoomView::from_thread)
}

fn local_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(t) => t.format("%H:%M:%S").to_string(),
        None => String::new(),
    }
}

/// RGB colour used for a thread type
pub fn kind_color(kind: &MessageType) -> u32 {
    match kind {
        MessageType::Thread => 0x00ff88,
        MessageType::Direct => 0x0088ff,
        MessageType::Spam => 0xff4466,
        MessageType::Other(_) => 0x00d4ff,
    }
}

/// Placement of one thread node in the spiral scene
#[derive(Debug, Clone, Serialize)]
pub struct NodeLayout {
    pub thread_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    pub glow_radius: f64,
    pub color: u32,
}

/// Lay out non-spam threads along a two-turn spiral.
///
/// Node size grows with message count; depth is jittered with `rng`.
pub fn spiral_layout<R: Rng>(agg: &Aggregator, rng: &mut R) -> Vec<NodeLayout> {
    let threads = agg.sorted_threads();
    let total = threads.len();

    threads
        .into_iter()
        .enumerate()
        .map(|(index, thread)| {
            let angle = (index as f64 / total as f64) * PI * 4.0;
            let distance = 10.0 + index as f64 * 2.0;
            let size = thread.messages.len() as f64 * 0.5;
            NodeLayout {
                thread_id: thread.id.clone(),
                x: angle.cos() * distance,
                y: angle.sin() * distance,
                z: (rng.gen::<f64>() - 0.5) * 20.0,
                radius: 2.0 + size,
                glow_radius: 3.0 + size,
                color: kind_color(&thread.kind),
            }
        })
        .collect()
}
