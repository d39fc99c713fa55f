use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use log::*;

#[derive(Debug, Default, PartialEq, Clone)]
pub struct Tags(HashMap<String, String>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MalformedTags;

impl Tags {
    /// Parses a tag section (without the leading `@`).
    ///
    /// Entries are separated by `;`. An entry without `=` maps to an empty
    /// value. An entry with an empty key makes the whole section malformed.
    pub fn parse(input: &str) -> Result<Self, MalformedTags> {
        let mut map = HashMap::new();
        for part in input.split_terminator(';') {
            let (k, v) = match part.find('=') {
                Some(index) => (&part[..index], &part[index + 1..]),
                None => (part, ""),
            };
            if k.is_empty() {
                debug!("empty tag key in: {}", input);
                return Err(MalformedTags);
            }
            map.insert(k.into(), unescape(v));
        }
        Ok(Self(map))
    }

    pub fn get<S>(&self, s: S) -> Option<&str>
    where
        S: AsRef<str>,
    {
        self.0.get(s.as_ref()).map(|n| n.as_ref())
    }

    pub fn get_display(&self) -> Option<&str> {
        self.get("display-name").filter(|s| !s.is_empty())
    }

    pub fn get_userid(&self) -> Option<i64> {
        self.get("user-id")?.parse::<i64>().ok()
    }

    /// Badge names from the `badges` tag, versions stripped. Unknown names are skipped.
    pub fn get_badges(&self) -> Vec<Badge> {
        self.get("badges")
            .map(|s| {
                s.split(',')
                    .filter_map(|s| s.split('/').next())
                    .filter_map(|s| Badge::from_str(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_badge(&self, badge: Badge) -> bool {
        self.get_badges().contains(&badge)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serializes back into a tag section, without the leading `@`.
impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}={}", k, escape(v))?;
        }
        Ok(())
    }
}

fn unescape(input: &str) -> String {
    if !input.contains('\\') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut iter = input.chars();
    while let Some(ch) = iter.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match iter.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(ch) => out.push(ch),
            // a trailing lone backslash is dropped
            None => {}
        }
    }
    out
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            ';' => out.push_str("\\:"),
            ' ' => out.push_str("\\s"),
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ch => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Badge {
    Admin,
    Broadcaster,
    GlobalMod,
    Moderator,
    Subscriber,
    Staff,
    Turbo,
    Premium,
    Vip,
}

impl FromStr for Badge {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let res = match s.to_ascii_lowercase().as_str() {
            "admin" => Badge::Admin,
            "broadcaster" => Badge::Broadcaster,
            "global_mod" => Badge::GlobalMod,
            "moderator" => Badge::Moderator,
            "subscriber" => Badge::Subscriber,
            "staff" => Badge::Staff,
            "turbo" => Badge::Turbo,
            "premium" => Badge::Premium,
            "vip" => Badge::Vip,
            _ => return Err(()),
        };
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags() {
        let input = "badges=moderator/1;color=#FF0000;display-name=Foo;emotes=;mod";
        let tags = Tags::parse(input).unwrap();
        assert_eq!(tags.len(), 5);
        assert_eq!(tags.get("color"), Some("#FF0000"));
        assert_eq!(tags.get_display(), Some("Foo"));
        assert_eq!(tags.get("emotes"), Some(""));
        assert_eq!(tags.get("mod"), Some(""));
        assert_eq!(tags.get("missing"), None);
    }

    #[test]
    fn malformed_tags() {
        assert_eq!(Tags::parse("a=1;=2"), Err(MalformedTags));
        assert!(Tags::parse("a=1;;b=2").is_err());
    }

    #[test]
    fn unescape_values() {
        let tags = Tags::parse(r"system-msg=hello\sthere\:\sfriend\\").unwrap();
        assert_eq!(tags.get("system-msg"), Some(r"hello there; friend\"));
    }

    #[test]
    fn round_trip() {
        let inputs = &[
            "badges=broadcaster/1,subscriber/12;color=#1E90FF;user-id=1234",
            r"room-id=42;slow=0;subs-only=1;r9k=0",
            r"msg=a\sb\:c\\d;empty=",
        ];

        for input in inputs {
            let tags = Tags::parse(input).unwrap();
            let again = Tags::parse(&tags.to_string()).unwrap();
            assert_eq!(tags, again);
        }
    }

    #[test]
    fn badges() {
        let tags = Tags::parse("badges=broadcaster/1,subscriber/0,bits/100").unwrap();
        assert_eq!(tags.get_badges(), vec![Badge::Broadcaster, Badge::Subscriber]);
        assert!(tags.has_badge(Badge::Broadcaster));
        assert!(!tags.has_badge(Badge::Moderator));

        assert!(Tags::default().get_badges().is_empty());
    }
}
