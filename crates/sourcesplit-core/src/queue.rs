//! Parsers for the engine's pending I/O events and active screen fades
//!
//! Both live in foreign memory that the game mutates while we read it, so
//! every walk is bounded: it ends at its cap or at the first null link,
//! whichever comes first. A cycle inside the cap simply runs out the cap and
//! reports "not found".

use tracing::trace;

use crate::memory::layout::{event_queue, fade};
use crate::memory::{LeBytes, ReadMemory, ReadValueExt, RemoteValue};

/// Iterator over node addresses of a foreign list, at most `cap` items
pub struct BoundedWalk<F> {
    next: u64,
    remaining: usize,
    successor: F,
}

impl<F> BoundedWalk<F>
where
    F: FnMut(u64) -> Option<u64>,
{
    /// `successor` maps a node to the next one; `None` or zero ends the walk
    pub fn new(start: u64, cap: usize, successor: F) -> Self {
        Self {
            next: start,
            remaining: cap,
            successor,
        }
    }
}

impl<F> Iterator for BoundedWalk<F>
where
    F: FnMut(u64) -> Option<u64>,
{
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.remaining == 0 || self.next == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.next;
        self.next = (self.successor)(current).unwrap_or(0);
        Some(current)
    }
}

/// How a string field is compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    Exact(String),
    Contains(String),
}

impl TextMatch {
    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => value == expected,
            Self::Contains(needle) => value.contains(needle.as_str()),
        }
    }

    fn matches_ignore_case(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        match self {
            Self::Exact(expected) => value == expected.to_lowercase(),
            Self::Contains(needle) => value.contains(&needle.to_lowercase()),
        }
    }
}

/// One pending entity I/O event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueEvent {
    pub fire_time: f32,
    pub target: String,
    pub input: String,
    pub parameter: String,
    pub next: u64,
}

/// Filter for [`EventQueue::find_fire_time`].
///
/// The target is case-sensitive; input and parameter compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub target: TextMatch,
    pub input: Option<TextMatch>,
    pub parameter: Option<TextMatch>,
}

impl EventQuery {
    pub fn target(name: &str) -> Self {
        Self {
            target: TextMatch::Exact(name.to_string()),
            input: None,
            parameter: None,
        }
    }

    pub fn target_containing(fragment: &str) -> Self {
        Self {
            target: TextMatch::Contains(fragment.to_string()),
            input: None,
            parameter: None,
        }
    }

    pub fn with_input(mut self, input: TextMatch) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_parameter(mut self, parameter: TextMatch) -> Self {
        self.parameter = Some(parameter);
        self
    }

    pub fn matches(&self, event: &QueueEvent) -> bool {
        self.target.matches(&event.target)
            && self
                .input
                .as_ref()
                .is_none_or(|m| m.matches_ignore_case(&event.input))
            && self
                .parameter
                .as_ref()
                .is_none_or(|m| m.matches_ignore_case(&event.parameter))
    }
}

/// The server's `g_EventQueue`
pub struct EventQueue<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    /// Address holding the pointer to the first pending event
    head: u64,
}

impl<'a, R: ReadMemory + ?Sized> EventQueue<'a, R> {
    pub fn new(reader: &'a R, head: u64) -> Self {
        Self { reader, head }
    }

    fn read_event(&self, node: u64) -> Option<QueueEvent> {
        let bytes = self.reader.read_bytes(node, event_queue::NODE_SIZE).ok()?;
        let word = |offset: u64| u64::from(LeBytes::at(&bytes, offset as usize).u32());
        let text = |ptr: u64| {
            if ptr == 0 {
                String::new()
            } else {
                self.reader.read_string(ptr, event_queue::STRING_MAX_LEN)
            }
        };

        Some(QueueEvent {
            fire_time: LeBytes::at(&bytes, event_queue::FIRE_TIME as usize).f32(),
            target: text(word(event_queue::TARGET)),
            input: text(word(event_queue::TARGET_INPUT)),
            parameter: text(word(event_queue::PARAMETER)),
            next: word(event_queue::NEXT),
        })
    }

    fn first_node(&self) -> u64 {
        self.reader.read_pointer(self.head).unwrap_or(0)
    }

    /// Pending events in queue order, at most `cap`
    pub fn events(&self, cap: usize) -> Vec<QueueEvent> {
        let mut events = Vec::new();
        let walk = BoundedWalk::new(self.first_node(), cap, |node| {
            self.reader.read_pointer(node + event_queue::NEXT).ok()
        });
        for node in walk {
            match self.read_event(node) {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    }

    /// Fire time of the first pending event matching `query`, or 0.0
    pub fn find_fire_time(&self, query: &EventQuery, cap: usize) -> f32 {
        let first = self.first_node();
        if first == 0 {
            return 0.0;
        }

        let walk = BoundedWalk::new(first, cap, |node| {
            self.reader.read_pointer(node + event_queue::NEXT).ok()
        });
        for node in walk {
            let Some(event) = self.read_event(node) else {
                break;
            };
            if query.matches(&event) {
                trace!("Event for {} fires at {}", event.target, event.fire_time);
                return event.fire_time;
            }
        }

        0.0
    }
}

/// One client-side `ScreenFade_t` record
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FadeEvent {
    pub speed: f32,
    pub end: f32,
    pub reset: f32,
    pub color: [u8; 4],
    pub flags: i32,
}

impl RemoteValue for FadeEvent {
    const SIZE: usize = fade::INFO_SIZE;

    fn decode(bytes: &[u8]) -> Self {
        let mut cursor = LeBytes::new(bytes);
        Self {
            speed: cursor.f32(),
            end: cursor.f32(),
            reset: cursor.f32(),
            color: [cursor.u8(), cursor.u8(), cursor.u8(), cursor.u8()],
            flags: cursor.i32(),
        }
    }
}

/// Filter for [`FadeList::find_end_time`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeQuery {
    /// Compared bit-exactly
    pub speed: f32,
    pub rgb: Option<[u8; 3]>,
}

impl FadeQuery {
    pub fn speed(speed: f32) -> Self {
        Self { speed, rgb: None }
    }

    pub fn with_color(mut self, r: u8, g: u8, b: u8) -> Self {
        self.rgb = Some([r, g, b]);
        self
    }

    pub fn matches(&self, fade: &FadeEvent) -> bool {
        fade.speed.to_bits() == self.speed.to_bits()
            && self
                .rgb
                .is_none_or(|rgb| fade.color[..3] == rgb)
    }
}

/// The client's vector of active fades
pub struct FadeList<'a, R: ReadMemory + ?Sized> {
    reader: &'a R,
    base: u64,
}

impl<'a, R: ReadMemory + ?Sized> FadeList<'a, R> {
    pub fn new(reader: &'a R, base: u64) -> Self {
        Self { reader, base }
    }

    pub fn count(&self) -> usize {
        self.reader
            .read_i32(self.base + fade::LIST_COUNT)
            .map(|count| count.max(0) as usize)
            .unwrap_or(0)
    }

    /// Active fades in list order, at most `cap`
    pub fn fades(&self, cap: usize) -> Vec<FadeEvent> {
        self.entries(cap).collect()
    }

    fn entries(&self, cap: usize) -> impl Iterator<Item = FadeEvent> + '_ {
        let count = self.count();
        let storage = if count == 0 {
            0
        } else {
            self.reader
                .read_pointer(self.base + fade::LIST_STORAGE)
                .unwrap_or(0)
        };

        BoundedWalk::new(storage, count.min(cap), |slot| {
            Some(slot + fade::ENTRY_STRIDE)
        })
        .map_while(|slot| {
            let entry = self.reader.read_pointer(slot).ok()?;
            if entry == 0 {
                return None;
            }
            self.reader.read_value::<FadeEvent>(entry).ok()
        })
    }

    /// End time of the first active fade matching `query`, or 0.0
    pub fn find_end_time(&self, query: &FadeQuery, cap: usize) -> f32 {
        self.entries(cap)
            .find(|fade| query.matches(fade))
            .map(|fade| fade.end)
            .unwrap_or(0.0)
    }
}
