use std::{
    fs, io, mem,
    path::Path,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use num_traits::{One, WrappingAdd};

pub const NET_CONNECT_TIMEOUT: Duration = Duration::from_millis(8 * 1000);

pub const NET_IO_TIMEOUT: Duration = Duration::from_millis(16 * 1000);

pub const NET_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Agent configuration shared by all catalog requests.  Non-success statuses
/// are returned as responses so that callers can inspect them (429 handling).
pub fn default_ureq_agent_builder(
    proxy_url: Option<&str>,
) -> ureq::config::ConfigBuilder<ureq::typestate::AgentScope> {
    let mut agent = ureq::Agent::config_builder()
        .timeout_global(Some(NET_REQUEST_TIMEOUT))
        .timeout_connect(Some(NET_CONNECT_TIMEOUT))
        .timeout_recv_response(Some(NET_IO_TIMEOUT))
        .timeout_send_request(Some(NET_IO_TIMEOUT))
        .http_status_as_error(false);

    if let Some(proxy_url) = proxy_url {
        let proxy = ureq::Proxy::new(proxy_url).ok();
        if proxy.is_none() {
            log::warn!("ignoring invalid proxy URL: {proxy_url}");
        }
        agent = agent.proxy(proxy);
    }

    agent
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Sequence<T>(T);

impl<T: One + WrappingAdd> Sequence<T> {
    pub fn new(value: T) -> Self {
        Sequence(value)
    }

    pub fn advance(&mut self) -> T {
        let next = self.0.wrapping_add(&T::one());
        mem::replace(&mut self.0, next)
    }
}

pub fn mkdir_if_not_exists(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).or_else(|err| {
        if err.kind() == io::ErrorKind::AlreadyExists {
            Ok(())
        } else {
            Err(err)
        }
    })
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_hands_out_consecutive_values() {
        let mut seq = Sequence::new(0_u64);
        assert_eq!(seq.advance(), 0);
        assert_eq!(seq.advance(), 1);
        assert_eq!(seq.advance(), 2);

        let mut wrapping = Sequence::new(u8::MAX);
        assert_eq!(wrapping.advance(), u8::MAX);
        assert_eq!(wrapping.advance(), 0);
    }

    #[test]
    fn mkdir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b");
        mkdir_if_not_exists(&path).unwrap();
        mkdir_if_not_exists(&path).unwrap();
        assert!(path.is_dir());
    }
}
