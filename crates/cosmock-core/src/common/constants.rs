//! Fixed geometry, cosmology, and binning constants shared by the drivers.
//!
//! The 2LPT cosmology block matches the AbacusSummit `c000` transfer table
//! shipped under `conf_2lpt/`.

pub const PI: f64 = std::f64::consts::PI;

/// Reference box side length in Mpc/h used for clustering measurements.
pub const REFERENCE_LBOX: f64 = 2000.0;
/// Reference FFT grid for power spectrum and bispectrum estimation.
pub const REFERENCE_NGRID: usize = 512;

pub const OMEGA_M: f64 = 0.315192;
pub const OMEGA_LAMBDA: f64 = 0.684808;
pub const OMEGA_BARYON: f64 = 0.0493;
pub const OMEGA_DM_2ND_SPECIES: f64 = 0.00;
pub const HUBBLE_PARAM: f64 = 0.6736;
pub const SIGMA8: f64 = 0.819;
pub const PRIMORDIAL_INDEX: f64 = 0.9649;

pub const UNIT_LENGTH_IN_CM: &str = "3.085678e24";
pub const UNIT_MASS_IN_G: &str = "1.989e43";
pub const UNIT_VELOCITY_IN_CM_PER_S: &str = "1e5";

/// Number of `mu` bins handed to the generator's multipole routine.
pub const MULTIPOLE_NBINS_MU: usize = 40;
/// Leading `rp` edges dropped when deriving the `s` bins for multipoles.
pub const MULTIPOLE_SBIN_OFFSET: usize = 5;
/// Number of `mu` bins for the reference correlation function.
pub const CORRELATION_NMU: usize = 100;

/// Hubble constant in units of h km/s/Mpc; converts velocities to Mpc/h.
pub const HUBBLE_100: f64 = 100.0;
