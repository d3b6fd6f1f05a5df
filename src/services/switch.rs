//! Switch a site's modulators on or off through `updateOnOffEvent`.

use log::info;

use crate::client::{ClientError, RawResponse, VoltalisClient};
use crate::models::voltalis::{CsLinkSwitch, Modulator, OnOffUpdate, Site};

/// One entry per modulator of `site`, in listing order. `status` decides each
/// device's new state.
pub fn on_off_payload(site: &Site, status: impl Fn(&Modulator) -> bool) -> OnOffUpdate {
    OnOffUpdate {
        cs_link_list: site
            .modulators
            .iter()
            .map(|m| CsLinkSwitch {
                name: m.name.clone(),
                cs_link_id: m.uid,
                cs_link_to_cut_id: m.uid,
                modulation: false,
                status: status(m),
                is_programmable: true,
            })
            .collect(),
    }
}

pub fn switch_all(client: &VoltalisClient, site: &Site, on: bool) -> Result<RawResponse, ClientError> {
    let payload = on_off_payload(site, |_| on);
    info!(
        "Site {}: switching {} modulator(s) {}",
        site.uid,
        payload.cs_link_list.len(),
        if on { "on" } else { "off" }
    );
    client.update_on_off(site.uid, &payload)
}
