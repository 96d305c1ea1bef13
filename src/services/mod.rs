pub mod alert_feed;
pub mod coalesce;
pub mod demo;
pub mod geocode;
pub mod lifecycle;
pub mod profiles;
pub mod risk;
pub mod tracking;
