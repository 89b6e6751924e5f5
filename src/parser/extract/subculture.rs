const RATIO_KEY: &str = "subcultivation ratio:";
const RENEWAL_KEY: &str = "medium renewal:";

/// Key-value facts embedded in subculturing text.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Lifted {
    pub ratio: Option<String>,
    pub renewal: Option<String>,
}

impl Lifted {
    /// Remove `Subcultivation ratio: …` / `Medium renewal: …` from each line of
    /// `text`, keeping the first value seen for each. Returns the remaining text.
    pub fn take_from(&mut self, text: &str) -> String {
        text.lines()
            .map(|line| self.take_from_line(line))
            .filter(|l| !l.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn take_from_line(&mut self, line: &str) -> String {
        // ASCII lowering keeps byte offsets aligned with `line`
        let lower = line.to_ascii_lowercase();
        let ratio_at = lower.find(RATIO_KEY);
        let renewal_at = lower.find(RENEWAL_KEY);

        let first = match (ratio_at, renewal_at) {
            (None, None) => return line.to_string(),
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
        };

        let value_between = |start: usize, key: &str, other: Option<usize>| -> String {
            let from = start + key.len();
            let to = other.filter(|o| *o > start).unwrap_or(line.len());
            line[from..to].trim().trim_end_matches(['.', ';', ',']).trim().to_string()
        };

        if let Some(at) = ratio_at {
            let value = value_between(at, RATIO_KEY, renewal_at);
            if self.ratio.is_none() && !value.is_empty() {
                self.ratio = Some(value);
            }
        }
        if let Some(at) = renewal_at {
            let value = value_between(at, RENEWAL_KEY, ratio_at);
            if self.renewal.is_none() && !value.is_empty() {
                self.renewal = Some(value);
            }
        }

        line[..first].trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_keys_on_one_line() {
        let mut lifted = Lifted::default();
        let rest = lifted.take_from("Split cells. Subcultivation Ratio: 1:4 to 1:8. Medium Renewal: Every 2 to 3 days");
        assert_eq!(rest, "Split cells.");
        assert_eq!(lifted.ratio.as_deref(), Some("1:4 to 1:8"));
        assert_eq!(lifted.renewal.as_deref(), Some("Every 2 to 3 days"));
    }

    #[test]
    fn renewal_before_ratio() {
        let mut lifted = Lifted::default();
        let rest = lifted.take_from("Medium renewal: twice weekly\nSubcultivation ratio: 1:2\nKeep going");
        assert_eq!(rest, "Keep going");
        assert_eq!(lifted.ratio.as_deref(), Some("1:2"));
        assert_eq!(lifted.renewal.as_deref(), Some("twice weekly"));
    }

    #[test]
    fn untouched_without_keys() {
        let mut lifted = Lifted::default();
        assert_eq!(lifted.take_from("Remove medium.\nAdd trypsin."), "Remove medium.\nAdd trypsin.");
        assert_eq!(lifted, Lifted::default());
    }
}
