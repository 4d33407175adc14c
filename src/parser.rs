//! Pulls player counts and the map name out of free-form console output.
//!
//! Nothing here fails. When a pattern is missing the caller keeps whatever it
//! had before, so a parse miss never looks like an empty server.

const MAP_MARKER: &str = "Current map: ";

/// Fields the poller tracks per target that come from command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFields {
    pub players: u32,
    pub max_players: u32,
    pub map_name: String,
}

impl StatusFields {
    /// Updates the player counts from `status` output. Returns whether
    /// anything matched.
    pub fn apply_status(&mut self, text: &str) -> bool {
        match parse_player_counts(text) {
            Some((players, max_players)) => {
                self.players = players;
                self.max_players = max_players;
                true
            }
            None => false,
        }
    }

    /// Updates the map name from current-map output. Returns whether the
    /// marker was found.
    pub fn apply_map(&mut self, text: &str) -> bool {
        match parse_current_map(text) {
            Some(map) => {
                self.map_name = map.to_owned();
                true
            }
            None => false,
        }
    }
}

/// Looks at lines mentioning "players" (any case) for an integer token
/// directly followed by a token with a `/`, e.g. `5 5/32`. The integer is the
/// current count, the part after the slash the capacity.
pub fn parse_player_counts(text: &str) -> Option<(u32, u32)> {
    text.lines()
        .filter(|line| line.to_lowercase().contains("players"))
        .find_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            tokens.windows(2).find_map(|pair| {
                let current = pair[0].parse::<u32>().ok()?;
                let (_, max) = pair[1].split_once('/')?;
                Some((current, leading_number(max)?))
            })
        })
}

/// Text after the first `Current map: ` up to the end of that line, trimmed.
pub fn parse_current_map(text: &str) -> Option<&str> {
    let (_, rest) = text.split_once(MAP_MARKER)?;
    let line = match rest.split_once('\n') {
        Some((line, _)) => line,
        None => rest,
    };
    let map = line.trim();
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

// "32)" -> 32
fn leading_number(token: &str) -> Option<u32> {
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    token[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> StatusFields {
        StatusFields {
            players: 7,
            max_players: 24,
            map_name: "gm_construct".to_owned(),
        }
    }

    #[test]
    fn counts_from_slash_pair() {
        let mut f = fields();
        assert!(f.apply_status("hostname: TTT\nPlayers : 5 5/10\n"));
        assert_eq!((f.players, f.max_players), (5, 10));
    }

    #[test]
    fn counts_with_trailing_punctuation() {
        assert_eq!(
            parse_player_counts("players: 12 12/32) online"),
            Some((12, 32))
        );
    }

    #[test]
    fn source_style_line_without_slash_is_a_miss() {
        let mut f = fields();
        assert!(!f.apply_status("players : 5 (10 max)"));
        assert_eq!(f, fields());
    }

    #[test]
    fn only_players_lines_are_considered() {
        assert_eq!(parse_player_counts("version 3 3/4\nmap : x"), None);
        assert_eq!(
            parse_player_counts("players : none\nPLAYERS 1 1/8"),
            Some((1, 8))
        );
    }

    #[test]
    fn garbage_leaves_fields_alone() {
        let mut f = fields();
        assert!(!f.apply_status(""));
        assert!(!f.apply_status("players / / 5"));
        assert!(!f.apply_map("no marker here"));
        assert_eq!(f, fields());
    }

    #[test]
    fn map_name_is_trimmed_line() {
        let mut f = fields();
        assert!(f.apply_map("Current map: ttt_minecraft_b5\nOther text"));
        assert_eq!(f.map_name, "ttt_minecraft_b5");
    }

    #[test]
    fn map_name_at_end_of_text() {
        assert_eq!(
            parse_current_map("Usage: changelevel <map>\nCurrent map: de_dust2  \r\n"),
            Some("de_dust2")
        );
        assert_eq!(parse_current_map("Current map:    \n"), None);
    }
}
