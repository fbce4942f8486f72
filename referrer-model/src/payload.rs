/// Install attribution details as reported by the referrer service.
///
/// Timestamps are seconds since the Unix epoch. The `*_server_*` variants are
/// stamped by the service rather than the device and are the ones to prefer
/// when clock skew matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AttributionPayload {
    /// Raw referrer URL parameters captured at install time.
    pub install_referrer: String,
    pub referrer_click_timestamp_seconds: i64,
    pub install_begin_timestamp_seconds: i64,
    pub referrer_click_timestamp_server_seconds: i64,
    pub install_begin_timestamp_server_seconds: i64,
    /// App version at the time of the first install.
    pub install_version: String,
    /// Experiment flag forwarded from the store listing.
    #[cfg_attr(feature = "serde", serde(rename = "googlePlayInstantParam"))]
    pub experiment_param: String,
}
