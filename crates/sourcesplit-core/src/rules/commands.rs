//! Runtime toggles typed into the game console
//!
//! The game keeps the last console command in a fixed buffer. A command of
//! the form `<feature><arg>` toggles a feature: an argument of `0` disables
//! it, any other character enables it (`xenstart1`, `ebend0`).

use std::collections::BTreeMap;

use tracing::info;

use crate::memory::ReadMemory;
use crate::watcher::StringWatcher;

/// Named on/off switches of one game
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    flags: BTreeMap<String, bool>,
    /// Pairs where enabling one disables the other
    exclusive: Vec<(String, String)>,
}

impl FeatureFlags {
    pub fn new<'s>(features: impl IntoIterator<Item = (&'s str, bool)>) -> Self {
        Self {
            flags: features
                .into_iter()
                .map(|(name, enabled)| (name.to_string(), enabled))
                .collect(),
            exclusive: Vec::new(),
        }
    }

    pub fn with_exclusive(mut self, a: &str, b: &str) -> Self {
        self.exclusive.push((a.to_string(), b.to_string()));
        self
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flags.keys().map(String::as_str)
    }

    /// Set a known feature; unknown names are ignored. Returns whether the name was known.
    pub fn set(&mut self, name: &str, enabled: bool) -> bool {
        let Some(slot) = self.flags.get_mut(name) else {
            return false;
        };
        *slot = enabled;
        info!("{} is {}", name, if enabled { "enabled" } else { "disabled" });

        if enabled {
            let partners: Vec<String> = self
                .exclusive
                .iter()
                .filter_map(|(a, b)| {
                    if a == name {
                        Some(b.clone())
                    } else if b == name {
                        Some(a.clone())
                    } else {
                        None
                    }
                })
                .collect();
            for partner in partners {
                if let Some(slot) = self.flags.get_mut(&partner)
                    && *slot
                {
                    *slot = false;
                    info!("{} is now disabled", partner);
                }
            }
        }
        true
    }

    /// Apply one raw console command. Returns the feature it toggled.
    pub fn apply_command(&mut self, raw: &str) -> Option<(String, bool)> {
        let (feature, enabled) = parse_command(raw)?;
        self.set(&feature, enabled).then_some((feature, enabled))
    }
}

/// Split `<feature><arg>` after stripping CR/LF and lowercasing
pub fn parse_command(raw: &str) -> Option<(String, bool)> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .to_lowercase();

    let mut chars = cleaned.chars();
    let arg = chars.next_back()?;
    let feature = chars.as_str();
    if feature.is_empty() {
        return None;
    }
    Some((feature.to_string(), arg != '0'))
}

/// Console command buffer watched for toggles
#[derive(Debug, Clone)]
pub struct CommandChannel {
    watcher: StringWatcher,
    seen: bool,
}

impl CommandChannel {
    /// Longest command that is parsed
    pub const MAX_LEN: usize = 20;

    pub fn new(address: u64) -> Self {
        Self {
            watcher: StringWatcher::new(address, Self::MAX_LEN),
            seen: false,
        }
    }

    pub fn current(&self) -> &str {
        self.watcher.current()
    }

    /// Read the buffer and apply it to `flags` when it changed.
    ///
    /// The first successful read always counts as a change, so a command typed
    /// before attaching still takes effect.
    pub fn poll<R: ReadMemory + ?Sized>(
        &mut self,
        reader: &R,
        flags: &mut FeatureFlags,
    ) -> Option<(String, bool)> {
        if !self.watcher.update(reader) {
            return None;
        }
        let first = !std::mem::replace(&mut self.seen, true);
        if !first && !self.watcher.changed() {
            return None;
        }
        flags.apply_command(self.watcher.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    fn xen_flags() -> FeatureFlags {
        FeatureFlags::new([("ebend", false), ("xenstart", false), ("xensplit", true)])
            .with_exclusive("xenstart", "xensplit")
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("xenstart1"), Some(("xenstart".into(), true)));
        assert_eq!(parse_command("EBEND0\r\n"), Some(("ebend".into(), false)));
        assert_eq!(parse_command("nihisplitx"), Some(("nihisplit".into(), true)));
        assert_eq!(parse_command("1"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_enable_disables_partner() {
        let mut flags = xen_flags();
        assert_eq!(
            flags.apply_command("xenstart1"),
            Some(("xenstart".into(), true))
        );
        assert!(flags.is_enabled("xenstart"));
        assert!(!flags.is_enabled("xensplit"));
    }

    #[test]
    fn test_disable_leaves_partner() {
        let mut flags = xen_flags();
        flags.apply_command("xenstart0");
        assert!(!flags.is_enabled("xenstart"));
        assert!(flags.is_enabled("xensplit"));
    }

    #[test]
    fn test_feature_name_must_match_exactly() {
        let mut flags = xen_flags();
        assert_eq!(flags.apply_command("xenstarts1"), None);
        assert_eq!(flags.apply_command("ebend"), None);
        assert!(!flags.is_enabled("ebend"));
        assert!(!flags.is_enabled("unknown"));
    }

    #[test]
    fn test_channel_applies_on_change_only() {
        let mut mem = MockMemoryBuilder::new().write_str(0x400, "ebend1").build();
        let mut channel = CommandChannel::new(0x400);
        let mut flags = xen_flags();

        // Typed before attach: applied on first read
        assert_eq!(channel.poll(&mem, &mut flags), Some(("ebend".into(), true)));
        flags.set("ebend", false);
        assert_eq!(channel.poll(&mem, &mut flags), None);
        assert!(!flags.is_enabled("ebend"));

        mem.write_str(0x400, "xensplit0\n");
        assert_eq!(
            channel.poll(&mem, &mut flags),
            Some(("xensplit".into(), false))
        );
        assert_eq!(channel.current(), "xensplit0\n");
    }
}
