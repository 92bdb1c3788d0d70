use tracing::debug;

use crate::rules::GameSupport;
use crate::rules::games::{BlackMesa, HalfLife2, WatchingPaintDry};
use crate::state::game_dir_name;

/// One fresh instance of every supported game, in detection order
pub fn supported_games() -> Vec<Box<dyn GameSupport>> {
    vec![
        Box::new(HalfLife2::new()),
        Box::new(BlackMesa::new()),
        Box::new(WatchingPaintDry::new()),
    ]
}

/// Rule set for the game running out of `game_dir`.
///
/// Accepts a full path or a bare directory name.
pub fn detect(game_dir: &str) -> Option<Box<dyn GameSupport>> {
    let dir_name = game_dir_name(game_dir);
    let game = supported_games()
        .into_iter()
        .find(|game| game.profile().matches_game_dir(&dir_name));
    match &game {
        Some(game) => debug!("Game dir '{}' is {}", dir_name, game.profile().name),
        None => debug!("Game dir '{}' is not supported", dir_name),
    }
    game
}

/// Rule set by display name, case-insensitive
pub fn by_name(name: &str) -> Option<Box<dyn GameSupport>> {
    supported_games()
        .into_iter()
        .find(|game| game.profile().name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_game_dir() {
        let game = detect(r"C:\Steam\steamapps\common\Half-Life 2\hl2").unwrap();
        assert_eq!(game.profile().name, "Half-Life 2");

        let game = detect("D:/Games/Black Mesa/BMS/").unwrap();
        assert_eq!(game.profile().name, "Black Mesa");

        let game = detect("watchingpaintdry").unwrap();
        assert!(game.profile().is_first_map("wpd_st"));
    }

    #[test]
    fn test_unknown_game_dir() {
        assert!(detect(r"C:\Games\portal").is_none());
        assert!(detect("").is_none());
    }

    #[test]
    fn test_by_name() {
        assert!(by_name("black mesa").is_some());
        assert!(by_name("Portal").is_none());
    }

    #[test]
    fn test_game_dirs_are_unique() {
        let games = supported_games();
        for (i, a) in games.iter().enumerate() {
            for b in &games[i + 1..] {
                for dir in a.profile().game_dirs {
                    assert!(!b.profile().matches_game_dir(dir));
                }
            }
        }
    }
}
