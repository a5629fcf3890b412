//! Maps a [`LinkType`] to the probe that understands it.

use std::{collections::HashMap, sync::Arc};

use linkwatch_core::link::LinkType;
use linkwatch_http::ResilientClient;

use crate::{
  Result,
  probe::{GithubProbe, Probe, StackOverflowProbe},
};

#[derive(Clone, Default)]
pub struct ProbeFactory {
  probes: HashMap<LinkType, Arc<dyn Probe>>,
}

impl ProbeFactory {
  pub fn new() -> Self { Self::default() }

  /// The GitHub and StackOverflow probes sharing one client.
  pub fn standard(
    client: ResilientClient,
    github_api_url: &str,
    github_token: Option<String>,
    stackoverflow_api_url: &str,
  ) -> Self {
    Self::new()
      .register(Arc::new(GithubProbe::new(client.clone(), github_api_url, github_token)))
      .register(Arc::new(StackOverflowProbe::new(client, stackoverflow_api_url)))
  }

  /// Register `probe` under its own link type, replacing any previous one.
  pub fn register(mut self, probe: Arc<dyn Probe>) -> Self {
    self.probes.insert(probe.link_type(), probe);
    self
  }

  pub fn probe_for(&self, link_type: LinkType, url: &str) -> Result<Arc<dyn Probe>> {
    self
      .probes
      .get(&link_type)
      .cloned()
      .ok_or_else(|| linkwatch_core::Error::UnsupportedLinkType(url.to_owned()).into())
  }
}
