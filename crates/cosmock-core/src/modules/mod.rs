pub mod catalog;
pub mod clustering;
pub mod compare;
pub mod disp2lpt;
pub mod external;
pub mod ezmock;
pub mod likelihood;
pub mod mock;
pub mod serialization;
pub mod traits;

pub use traits::{
    BispectrumEstimator, CorrelationEstimator, EzmockEngine, HodGenerator, MultipoleEstimator,
    PowerSpectrumEstimator,
};
