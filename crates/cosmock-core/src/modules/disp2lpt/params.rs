use crate::common::constants::{
    HUBBLE_PARAM, OMEGA_BARYON, OMEGA_DM_2ND_SPECIES, OMEGA_LAMBDA, OMEGA_M, PRIMORDIAL_INDEX,
    REFERENCE_LBOX, REFERENCE_NGRID, SIGMA8, UNIT_LENGTH_IN_CM, UNIT_MASS_IN_G,
    UNIT_VELOCITY_IN_CM_PER_S,
};
use crate::domain::PipelineResult;
use crate::modules::serialization::write_text_artifact;
use std::path::Path;

/// Keys of a 2LPT parameter file in the order the binary's reader expects.
pub const PARAM_KEYS: [&str; 33] = [
    "Nmesh",
    "Nsample",
    "Box",
    "FileBase",
    "OutputDir",
    "GlassFile",
    "GlassTileFac",
    "Omega",
    "OmegaLambda",
    "OmegaBaryon",
    "OmegaDM_2ndSpecies",
    "HubbleParam",
    "Sigma8",
    "PrimordialIndex",
    "Redshift",
    "Fnl",
    "FixedAmplitude",
    "PhaseFlip",
    "SphereMode",
    "WhichSpectrum",
    "FileWithInputSpectrum",
    "InputSpectrum_UnitLength_in_cm",
    "ShapeGamma",
    "WhichTransfer",
    "FileWithInputTransfer",
    "Seed",
    "NumFilesWrittenInParallel",
    "UnitLength_in_cm",
    "UnitMass_in_g",
    "UnitVelocity_in_cm_per_s",
    "WDM_On",
    "WDM_Vtherm_On",
    "WDM_PartMass_in_kev",
];

const OUTPUT_DIR: &str = "no_need_of_dir";
const GLASS_FILE: &str = "conf_2lpt/glass1_le";
const INPUT_SPECTRUM_FILE: &str = "conf_2lpt/no_need_of_file.txt";
const INPUT_TRANSFER_FILE: &str = "conf_2lpt/abacus_c000_tk.dat";
const SHAPE_GAMMA: f64 = 0.201;
const WHICH_TRANSFER: u32 = 2;
const WDM_PART_MASS_KEV: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disp2LptParams {
    pub seed: u64,
    pub redshift: f64,
    pub fnl: f64,
    pub ngrid: u32,
    pub lbox: u32,
    /// Fix the amplitude of the initial Fourier modes.
    pub fix_amp: bool,
}

impl Disp2LptParams {
    pub fn new(seed: u64, redshift: f64, fnl: f64) -> Self {
        Self {
            seed,
            redshift,
            fnl,
            ngrid: REFERENCE_NGRID as u32,
            lbox: REFERENCE_LBOX as u32,
            fix_amp: false,
        }
    }

    pub fn param_file_name(&self) -> String {
        format!("r{}.param", self.seed)
    }

    pub fn log_file_name(&self) -> String {
        format!("2lpt_r{}.log", self.seed)
    }
}

/// Renders the parameter file. Output depends only on `params`.
pub fn render_2lpt_params(params: &Disp2LptParams) -> String {
    let sections: [(usize, Vec<(&str, String)>); 8] = [
        (
            14,
            vec![
                ("Nmesh", params.ngrid.to_string()),
                ("Nsample", params.ngrid.to_string()),
                ("Box", params.lbox.to_string()),
                ("FileBase", format!("ics_{}_{}", params.ngrid, params.lbox)),
                ("OutputDir", OUTPUT_DIR.to_string()),
                ("GlassFile", GLASS_FILE.to_string()),
                ("GlassTileFac", params.ngrid.to_string()),
            ],
        ),
        (
            20,
            vec![
                ("Omega", OMEGA_M.to_string()),
                ("OmegaLambda", OMEGA_LAMBDA.to_string()),
                ("OmegaBaryon", OMEGA_BARYON.to_string()),
                ("OmegaDM_2ndSpecies", format_float(OMEGA_DM_2ND_SPECIES)),
                ("HubbleParam", HUBBLE_PARAM.to_string()),
                ("Sigma8", SIGMA8.to_string()),
                ("PrimordialIndex", PRIMORDIAL_INDEX.to_string()),
                ("Redshift", format_float(params.redshift)),
                ("Fnl", format_float(params.fnl)),
            ],
        ),
        (
            17,
            vec![
                ("FixedAmplitude", u8::from(params.fix_amp).to_string()),
                ("PhaseFlip", "0".to_string()),
                ("SphereMode", "0".to_string()),
            ],
        ),
        (
            32,
            vec![
                ("WhichSpectrum", "0".to_string()),
                ("FileWithInputSpectrum", INPUT_SPECTRUM_FILE.to_string()),
                ("InputSpectrum_UnitLength_in_cm", UNIT_LENGTH_IN_CM.to_string()),
                ("ShapeGamma", SHAPE_GAMMA.to_string()),
                ("WhichTransfer", WHICH_TRANSFER.to_string()),
                ("FileWithInputTransfer", INPUT_TRANSFER_FILE.to_string()),
            ],
        ),
        (17, vec![("Seed", params.seed.to_string())]),
        (26, vec![("NumFilesWrittenInParallel", "1".to_string())]),
        (
            26,
            vec![
                ("UnitLength_in_cm", UNIT_LENGTH_IN_CM.to_string()),
                ("UnitMass_in_g", UNIT_MASS_IN_G.to_string()),
                ("UnitVelocity_in_cm_per_s", UNIT_VELOCITY_IN_CM_PER_S.to_string()),
            ],
        ),
        (
            21,
            vec![
                ("WDM_On", "0".to_string()),
                ("WDM_Vtherm_On", "0".to_string()),
                ("WDM_PartMass_in_kev", format_float(WDM_PART_MASS_KEV)),
            ],
        ),
    ];

    let mut text = String::new();
    for (index, (width, entries)) in sections.iter().enumerate() {
        if index > 0 {
            text.push('\n');
        }
        for (key, value) in entries {
            text.push_str(&format!("{key:<width$}{value}\n", width = *width));
        }
    }
    text
}

pub fn write_2lpt_params(params: &Disp2LptParams, path: &Path) -> PipelineResult<String> {
    let text = render_2lpt_params(params);
    write_text_artifact(path, &text)?;
    Ok(text)
}

/// Shortest round-trip text, keeping a `.0` on integral values (`600.0`).
fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains(['.', 'e', 'E']) {
        format!("{text}.0")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::{Disp2LptParams, PARAM_KEYS, render_2lpt_params, write_2lpt_params};
    use std::fs;
    use tempfile::TempDir;

    fn value_of<'a>(text: &'a str, key: &str) -> Option<&'a str> {
        text.lines().find_map(|line| {
            let mut tokens = line.split_whitespace();
            (tokens.next() == Some(key)).then(|| tokens.next()).flatten()
        })
    }

    #[test]
    fn keys_appear_once_in_fixed_order() {
        let text = render_2lpt_params(&Disp2LptParams::new(42, 2.0, 600.0));
        let keys: Vec<&str> = text
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        assert_eq!(keys, PARAM_KEYS.to_vec());
    }

    #[test]
    fn rendering_is_a_pure_function_of_its_inputs() {
        let params = Disp2LptParams {
            seed: 7,
            redshift: 3.0,
            fnl: 1200.0,
            ngrid: 256,
            lbox: 1000,
            fix_amp: true,
        };
        assert_eq!(render_2lpt_params(&params), render_2lpt_params(&params));

        let other = Disp2LptParams { seed: 8, ..params };
        assert_ne!(render_2lpt_params(&params), render_2lpt_params(&other));
    }

    #[test]
    fn run_values_are_substituted() {
        let params = Disp2LptParams {
            seed: 43,
            redshift: 2.5,
            fnl: 600.0,
            ngrid: 256,
            lbox: 1000,
            fix_amp: true,
        };
        let text = render_2lpt_params(&params);

        assert_eq!(value_of(&text, "Nmesh"), Some("256"));
        assert_eq!(value_of(&text, "Nsample"), Some("256"));
        assert_eq!(value_of(&text, "GlassTileFac"), Some("256"));
        assert_eq!(value_of(&text, "Box"), Some("1000"));
        assert_eq!(value_of(&text, "FileBase"), Some("ics_256_1000"));
        assert_eq!(value_of(&text, "Redshift"), Some("2.5"));
        assert_eq!(value_of(&text, "Fnl"), Some("600.0"));
        assert_eq!(value_of(&text, "FixedAmplitude"), Some("1"));
        assert_eq!(value_of(&text, "Seed"), Some("43"));
        assert_eq!(value_of(&text, "Omega"), Some("0.315192"));
        assert_eq!(value_of(&text, "UnitMass_in_g"), Some("1.989e43"));
        assert_eq!(value_of(&text, "WDM_PartMass_in_kev"), Some("10.0"));
    }

    #[test]
    fn default_geometry_matches_reference_box() {
        let params = Disp2LptParams::new(1, 2.0, 0.0);
        assert_eq!(params.ngrid, 512);
        assert_eq!(params.lbox, 2000);
        assert!(!params.fix_amp);
        assert_eq!(value_of(&render_2lpt_params(&params), "FixedAmplitude"), Some("0"));
        assert_eq!(params.param_file_name(), "r1.param");
        assert_eq!(params.log_file_name(), "2lpt_r1.log");
    }

    #[test]
    fn written_file_matches_rendered_text() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("conf_2lpt/params_2lpt/r42.param");
        let params = Disp2LptParams::new(42, 2.0, 600.0);

        let text = write_2lpt_params(&params, &path).expect("param file should be written");
        assert_eq!(fs::read_to_string(&path).expect("param file should exist"), text);
    }
}
