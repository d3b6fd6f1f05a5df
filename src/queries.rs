//! Typed lookups over the scheduler listing calls.
//!
//! Each raw listing is fetched at most once per site for the lifetime of a
//! [`Queries`] value (unless the cache is bypassed). Entries are never refreshed
//! on their own: writes made through other paths are not visible until
//! [`Queries::forget`] is called for the site.

use log::debug;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::client::{ClientError, VoltalisClient};
use crate::models::codec;
use crate::models::voltalis::{
    AvailableModes, CurrentProgrammationModeElement, ModeList, ProgrammationMode, Scheduler, SchedulerList, SiteId,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    ModeList(SiteId),
    SchedulerList(SiteId),
    AvailableProgrammationMode(SiteId),
}

impl CallKey {
    pub fn site(self) -> SiteId {
        match self {
            CallKey::ModeList(site) | CallKey::SchedulerList(site) | CallKey::AvailableProgrammationMode(site) => site,
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            CallKey::ModeList(_) => "getModeList",
            CallKey::SchedulerList(_) => "getSchedulerList",
            CallKey::AvailableProgrammationMode(_) => "availableProgrammationMode",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Memoize,
    /// Every lookup hits the API.
    Bypass,
}

pub struct Queries<'a> {
    client: &'a VoltalisClient,
    policy: CachePolicy,
    cache: RefCell<HashMap<CallKey, Value>>,
}

impl<'a> Queries<'a> {
    pub fn new(client: &'a VoltalisClient) -> Self {
        Self::with_policy(client, CachePolicy::default())
    }

    pub fn with_policy(client: &'a VoltalisClient, policy: CachePolicy) -> Self {
        Queries {
            client,
            policy,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &'a VoltalisClient {
        self.client
    }

    fn fetch(&self, key: CallKey) -> Result<Value, ClientError> {
        if self.policy == CachePolicy::Memoize
            && let Some(hit) = self.cache.borrow().get(&key)
        {
            debug!("{} for site {}: cached", key.endpoint(), key.site());
            return Ok(hit.clone());
        }

        let value = match key {
            CallKey::ModeList(site) => self.client.mode_list(site)?,
            CallKey::SchedulerList(site) => self.client.scheduler_list(site)?,
            CallKey::AvailableProgrammationMode(site) => self.client.available_programmation_mode(site)?,
        };
        if self.policy == CachePolicy::Memoize {
            self.cache.borrow_mut().insert(key, value.clone());
        }
        Ok(value)
    }

    /// Drop every cached listing of `site`.
    pub fn forget(&self, site: SiteId) {
        self.cache.borrow_mut().retain(|key, _| key.site() != site);
    }

    pub fn modes(&self, site: SiteId) -> Result<Vec<ProgrammationMode>, ClientError> {
        let key = CallKey::ModeList(site);
        let list: Option<ModeList> = codec::decode(key.endpoint(), &self.fetch(key)?)?;
        Ok(list.unwrap_or_default().programmation_mode_list)
    }

    pub fn schedulers(&self, site: SiteId) -> Result<Vec<Scheduler>, ClientError> {
        let key = CallKey::SchedulerList(site);
        let list: Option<SchedulerList> = codec::decode(key.endpoint(), &self.fetch(key)?)?;
        Ok(list.unwrap_or_default().scheduler_list)
    }

    /// First mode named exactly `name`.
    pub fn mode_by_name(&self, site: SiteId, name: &str) -> Result<Option<ProgrammationMode>, ClientError> {
        Ok(self.modes(site)?.into_iter().find(|m| m.name == name))
    }

    /// First scheduler named exactly `name`.
    pub fn scheduler_by_name(&self, site: SiteId, name: &str) -> Result<Option<Scheduler>, ClientError> {
        Ok(self.schedulers(site)?.into_iter().find(|s| s.name == name))
    }

    /// Modes selectable for devices of `modulator_type_id`; empty when the type is unknown.
    pub fn available_modes_for(
        &self,
        site: SiteId,
        modulator_type_id: i64,
    ) -> Result<Vec<CurrentProgrammationModeElement>, ClientError> {
        let key = CallKey::AvailableProgrammationMode(site);
        let available: Option<AvailableModes> = codec::decode(key.endpoint(), &self.fetch(key)?)?;
        Ok(available
            .unwrap_or_default()
            .available_modes_by_modulator_type
            .remove(&modulator_type_id.to_string())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::classic_client;
    use crate::models::voltalis::TranslationKey;
    use crate::transport::fake::FakeTransport;
    use http::Method;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/data/{name}")).expect("fixture present")
    }

    fn transport() -> FakeTransport {
        FakeTransport::new()
            .on(Method::GET, "getModeList.json", 200, &fixture("mode-list.json"))
            .on(Method::GET, "getSchedulerList.json", 200, &fixture("scheduler-list.json"))
            .on(
                Method::GET,
                "availableProgrammationMode.json",
                200,
                &fixture("available-modes.json"),
            )
    }

    #[test]
    fn lookups_by_name_are_exact() {
        let transport = transport();
        let client = classic_client(&transport);
        let queries = Queries::new(&client);

        let eco = queries.mode_by_name(SiteId(1), "Eco").unwrap().expect("Eco mode");
        assert_eq!(eco.id, Some(101));
        assert!(queries.mode_by_name(SiteId(1), "eco").unwrap().is_none());
        assert!(queries.mode_by_name(SiteId(1), "AllEco").unwrap().is_none());

        let night = queries.scheduler_by_name(SiteId(1), "Semaine").unwrap().expect("scheduler");
        assert_eq!(night.id, Some(12));
        assert!(queries.scheduler_by_name(SiteId(1), "Absent").unwrap().is_none());
    }

    #[test]
    fn listings_are_memoized_per_site() {
        let transport = transport();
        let client = classic_client(&transport);
        let queries = Queries::new(&client);

        queries.modes(SiteId(1)).unwrap();
        queries.mode_by_name(SiteId(1), "Eco").unwrap();
        queries.mode_by_name(SiteId(1), "Confort").unwrap();
        assert_eq!(transport.calls_to("getModeList"), 1);

        queries.modes(SiteId(2)).unwrap();
        assert_eq!(transport.calls_to("getModeList"), 2);

        queries.forget(SiteId(1));
        queries.modes(SiteId(1)).unwrap();
        assert_eq!(transport.calls_to("getModeList"), 3);
    }

    #[test]
    fn bypass_always_calls_through() {
        let transport = transport();
        let client = classic_client(&transport);
        let queries = Queries::with_policy(&client, CachePolicy::Bypass);

        queries.schedulers(SiteId(1)).unwrap();
        queries.schedulers(SiteId(1)).unwrap();
        assert_eq!(transport.calls_to("getSchedulerList"), 2);
    }

    #[test]
    fn available_modes_are_keyed_by_type() {
        let transport = transport();
        let client = classic_client(&transport);
        let queries = Queries::new(&client);

        let keys: Vec<TranslationKey> = queries
            .available_modes_for(SiteId(1), 7)
            .unwrap()
            .iter()
            .map(|m| m.translation_key)
            .collect();
        assert_eq!(keys, [TranslationKey::On, TranslationKey::Eco, TranslationKey::Off]);
        assert!(queries.available_modes_for(SiteId(1), 1234).unwrap().is_empty());
        assert_eq!(transport.calls_to("availableProgrammationMode"), 1);
    }

    #[test]
    fn empty_listing_body_reads_as_empty() {
        let transport = FakeTransport::new().on(Method::GET, "getModeList.json", 204, "");
        let client = classic_client(&transport);
        assert!(Queries::new(&client).modes(SiteId(1)).unwrap().is_empty());
    }
}
