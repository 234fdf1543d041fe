//! Per-run traversal state
//!
//! The frontier holds listing pages still to visit, in FIFO order. The
//! visited set covers listing and item URLs alike, so a URL is handed out at
//! most once per run. Both are dropped with the run.

use std::collections::{HashSet, VecDeque};
use url::Url;

#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<String>,
    visited: HashSet<String>,
}

impl Frontier {
    /// Creates a frontier seeded with `start_url`
    pub fn new(start_url: &str) -> Self {
        let mut frontier = Self::default();
        frontier.push(start_url);
        frontier
    }

    /// Queues a listing page unless it was already visited
    pub fn push(&mut self, url: &str) -> bool {
        let key = normalize(url);
        if self.visited.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    /// Pops the next listing page that was not visited yet and marks it
    pub fn next_page(&mut self) -> Option<String> {
        while let Some(url) = self.queue.pop_front() {
            if self.visited.insert(url.clone()) {
                return Some(url);
            }
        }
        None
    }

    /// Marks `url` visited; returns false if it already was
    pub fn mark_visited(&mut self, url: &str) -> bool {
        self.visited.insert(normalize(url))
    }

}

#[cfg(test)]
impl Frontier {
    fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(&normalize(url))
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Strips the fragment so `page.html#top` and `page.html` share one key
pub fn normalize(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
