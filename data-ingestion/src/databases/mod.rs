pub mod timeseries;

pub use timeseries::TimeSeriesStore;
