use crate::util::{self, HttpError};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use hashbrown::{HashMap, HashSet};
use log::*;
use parking_lot::Mutex;
use serde::Deserialize;

/// REST lookups the client polls. Failures are reported as "no update".
pub trait Directory: Send + Sync {
    fn room_members(&self, channel: &str) -> Option<Chatters>;
    fn followers(&self, channel: &str) -> HashSet<Follower>;
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Chatters {
    pub broadcaster: Vec<String>,
    pub vips: Vec<String>,
    pub moderators: Vec<String>,
    pub staff: Vec<String>,
    pub admins: Vec<String>,
    pub global_mods: Vec<String>,
    pub viewers: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct Names {
    pub chatter_count: usize,
    pub chatters: Chatters,
}

/// Someone following the channel. Identity is the user id.
#[derive(Deserialize, Debug, Clone)]
pub struct Follower {
    #[serde(rename = "from_id")]
    pub id: String,
    #[serde(rename = "from_login")]
    pub login: String,
    #[serde(rename = "from_name")]
    pub display_name: String,
    pub followed_at: String,
}

impl PartialEq for Follower {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Follower {}

impl Hash for Follower {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

/// A channel someone follows.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FollowedChannel {
    #[serde(rename = "to_id")]
    pub id: String,
    #[serde(rename = "to_login")]
    pub login: String,
    #[serde(rename = "to_name")]
    pub display_name: String,
    pub followed_at: String,
}

#[derive(Deserialize, Debug)]
pub struct User {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

#[derive(Deserialize, Debug)]
struct Page<T> {
    data: Vec<T>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Deserialize, Debug, Default)]
struct Pagination {
    cursor: Option<String>,
}

/// Values that are good for a while.
pub struct Cache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, T)>>,
}

impl<T: Clone> Cache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((at, val)) if at.elapsed() < self.ttl => return Some(val.clone()),
            Some(..) => {}
            None => return None,
        }
        entries.remove(key);
        None
    }

    pub fn insert(&self, key: &str, val: T) {
        self.entries
            .lock()
            .insert(key.to_string(), (Instant::now(), val));
    }
}

pub struct TwitchClient {
    client_id: String,
    token: Option<String>,
    chatters: Cache<Chatters>,
    followers: Cache<HashSet<Follower>>,
    followed: Cache<Vec<FollowedChannel>>,
    follows_channel: Cache<Option<FollowedChannel>>,
}

impl TwitchClient {
    const BASE_URL: &'static str = "https://api.twitch.tv/helix";

    pub fn new(client_id: &str, token: Option<&str>, ttl: Duration) -> Self {
        Self {
            client_id: client_id.to_string(),
            token: token.map(|s| s.trim_start_matches("oauth:").to_string()),
            chatters: Cache::new(ttl),
            followers: Cache::new(ttl),
            followed: Cache::new(ttl),
            follows_channel: Cache::new(ttl),
        }
    }

    pub fn get_users<A, I>(&self, user_logins: I) -> Result<Vec<User>, Error>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let logins = user_logins
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect::<Vec<_>>();
        let query = logins
            .iter()
            .map(|s| ("login", s.as_str()))
            .collect::<Vec<_>>();
        self.get_response::<User>("users", &query)
            .map(|page| page.data)
    }

    /// Every follower of the user with this id.
    pub fn get_follows(&self, id: &str) -> Result<HashSet<Follower>, Error> {
        let followers = self.get_pages::<Follower>("users/follows", &[("to_id", id)])?;
        Ok(followers.into_iter().collect())
    }

    /// Every channel `user` follows.
    pub fn get_followed_channels(&self, user: &str) -> Result<Vec<FollowedChannel>, Error> {
        let user = login(user).to_lowercase();
        if let Some(channels) = self.followed.get(&user) {
            return Ok(channels);
        }

        let id = self.get_user_id(&user)?;
        let query = [("from_id", id.as_str())];
        let channels = self.get_pages::<FollowedChannel>("users/follows", &query)?;
        self.followed.insert(&user, channels.clone());
        Ok(channels)
    }

    /// The follow of `channel` by `user`, or `None` if they don't follow it.
    pub fn does_user_follow_channel(
        &self,
        user: &str,
        channel: &str,
    ) -> Result<Option<FollowedChannel>, Error> {
        let (user, channel) = (login(user).to_lowercase(), login(channel).to_lowercase());
        let key = format!("{}/{}", user, channel);
        if let Some(follow) = self.follows_channel.get(&key) {
            return Ok(follow);
        }

        let (from, to) = (self.get_user_id(&user)?, self.get_user_id(&channel)?);
        let query = [("from_id", from.as_str()), ("to_id", to.as_str())];
        let follow = self
            .get_response::<FollowedChannel>("users/follows", &query)?
            .data
            .into_iter()
            .next();

        self.follows_channel.insert(&key, follow.clone());
        Ok(follow)
    }

    fn get_user_id(&self, name: &str) -> Result<String, Error> {
        self.get_users(Some(name))?
            .into_iter()
            .next()
            .map(|user| user.id)
            .ok_or_else(|| Error::UnknownUser(name.to_string()))
    }

    // follows the pagination cursor until a page comes back empty
    fn get_pages<T>(&self, ep: &str, query: &[(&str, &str)]) -> Result<Vec<T>, Error>
    where
        for<'de> T: Deserialize<'de>,
    {
        let mut items = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let mut query = query.to_vec();
            query.push(("first", "100"));
            if let Some(cursor) = &cursor {
                query.push(("after", cursor.as_str()));
            }

            let page = self.get_response::<T>(ep, &query)?;
            let done = page.data.is_empty();
            items.extend(page.data);

            match page.pagination.cursor {
                Some(next) if !done => cursor = Some(next),
                _ => break,
            }
        }
        Ok(items)
    }

    pub fn get_names_for(channel: &str) -> Result<Names, Error> {
        let url = format!("https://tmi.twitch.tv/group/user/{}/chatters", channel);
        let names = util::http_get_json(&url)?;
        Ok(names)
    }

    fn get_response<T>(&self, ep: &str, query: &[(&str, &str)]) -> Result<Page<T>, Error>
    where
        for<'de> T: Deserialize<'de>,
    {
        let mut req = util::agent()
            .get(&format!("{}/{}", Self::BASE_URL, ep))
            .set("Client-ID", &self.client_id);
        if let Some(token) = &self.token {
            req = req.set("Authorization", &format!("Bearer {}", token));
        }
        for (key, val) in query {
            req = req.query(key, val);
        }

        let resp = req.call().map_err(|err| {
            warn!("cannot get twitch endpoint {}: {}", ep, err);
            Error::HttpGet(ep.to_string())
        })?;

        serde_json::from_reader(resp.into_reader()).map_err(Error::Deserialize)
    }
}

fn login(channel: &str) -> &str {
    channel.trim_start_matches('#')
}

impl Directory for TwitchClient {
    fn room_members(&self, channel: &str) -> Option<Chatters> {
        let channel = login(channel);
        if let Some(chatters) = self.chatters.get(channel) {
            return Some(chatters);
        }

        match Self::get_names_for(channel) {
            Ok(names) => {
                trace!("{} chatters in {}", names.chatter_count, channel);
                self.chatters.insert(channel, names.chatters.clone());
                Some(names.chatters)
            }
            Err(err) => {
                warn!("cannot get chatters for {}: {}", channel, err);
                None
            }
        }
    }

    fn followers(&self, channel: &str) -> HashSet<Follower> {
        let channel = login(channel);
        if let Some(followers) = self.followers.get(channel) {
            return followers;
        }

        let res = self
            .get_user_id(channel)
            .and_then(|id| self.get_follows(&id));

        match res {
            Ok(followers) => {
                self.followers.insert(channel, followers.clone());
                followers
            }
            Err(err) => {
                warn!("cannot get followers for {}: {}", channel, err);
                HashSet::new()
            }
        }
    }
}

#[derive(Debug)]
pub enum Error {
    HttpError(HttpError),
    HttpGet(String),
    Deserialize(serde_json::Error),
    UnknownUser(String),
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        Error::HttpError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::HttpError(err) => write!(f, "http error: {}", err),
            Error::HttpGet(ep) => write!(f, "cannot get twitch endpoint: {}", ep),
            Error::Deserialize(err) => write!(f, "json deserialize error: {}", err),
            Error::UnknownUser(name) => write!(f, "unknown user: {}", name),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::HttpError(err) => Some(err as &dyn std::error::Error),
            Error::Deserialize(err) => Some(err as &dyn std::error::Error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_expires() {
        let cache = Cache::new(Duration::from_millis(50));
        assert_eq!(cache.get("museun"), None);

        cache.insert("museun", 42);
        assert_eq!(cache.get("museun"), Some(42));
        assert_eq!(cache.get("other"), None);

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("museun"), None);
    }

    #[test]
    fn followers_are_unique_by_id() {
        let json = r#"{
            "total": 3,
            "data": [
                {
                    "from_id": "1",
                    "from_login": "alice",
                    "from_name": "Alice",
                    "to_id": "9",
                    "followed_at": "2019-01-01T00:00:00Z"
                },
                {
                    "from_id": "2",
                    "from_login": "bob",
                    "from_name": "Bob",
                    "to_id": "9",
                    "followed_at": "2019-01-02T00:00:00Z"
                },
                {
                    "from_id": "1",
                    "from_login": "alice",
                    "from_name": "ALICE",
                    "to_id": "9",
                    "followed_at": "2019-01-03T00:00:00Z"
                }
            ],
            "pagination": {"cursor": "abc"}
        }"#;

        let page: Page<Follower> = serde_json::from_str(json).unwrap();
        assert_eq!(page.pagination.cursor.as_ref().map(String::as_str), Some("abc"));
        let set = page.data.into_iter().collect::<HashSet<_>>();
        assert_eq!(set.len(), 2);
    }

    fn channel(id: &str, login: &str) -> FollowedChannel {
        FollowedChannel {
            id: id.into(),
            login: login.into(),
            display_name: login.into(),
            followed_at: "2019-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn followed_channels_json() {
        let json = r#"{
            "total": 1,
            "data": [
                {
                    "from_id": "1",
                    "from_login": "alice",
                    "from_name": "Alice",
                    "to_id": "9",
                    "to_login": "museun",
                    "to_name": "Museun",
                    "followed_at": "2019-01-01T00:00:00Z"
                }
            ],
            "pagination": {}
        }"#;

        let page: Page<FollowedChannel> = serde_json::from_str(json).unwrap();
        assert_eq!(page.pagination.cursor, None);
        assert_eq!(page.data[0].id, "9");
        assert_eq!(page.data[0].login, "museun");
        assert_eq!(page.data[0].display_name, "Museun");
    }

    #[test]
    fn follow_lookups_are_cached() {
        let client = TwitchClient::new("client-id", None, Duration::from_secs(60));
        client
            .followed
            .insert("alice", vec![channel("9", "museun"), channel("8", "shaken")]);
        client
            .follows_channel
            .insert("alice/museun", Some(channel("9", "museun")));
        client.follows_channel.insert("alice/other", None);

        let channels = client.get_followed_channels("#Alice").unwrap();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].login, "shaken");

        let follow = client.does_user_follow_channel("alice", "#museun").unwrap();
        assert_eq!(follow, Some(channel("9", "museun")));
        assert_eq!(client.does_user_follow_channel("Alice", "other").unwrap(), None);
    }

    #[test]
    fn chatters_json() {
        let json = r#"{
            "chatter_count": 3,
            "chatters": {
                "broadcaster": ["museun"],
                "vips": [],
                "moderators": ["shaken"],
                "staff": [],
                "admins": [],
                "global_mods": [],
                "viewers": ["someone"]
            }
        }"#;

        let names: Names = serde_json::from_str(json).unwrap();
        assert_eq!(names.chatter_count, 3);
        assert_eq!(names.chatters.moderators, vec!["shaken"]);
        assert_eq!(names.chatters.viewers, vec!["someone"]);
    }
}
