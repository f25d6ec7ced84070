mod correlator;

pub use correlator::correlate;
