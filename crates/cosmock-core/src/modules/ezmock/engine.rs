use super::{EzmockParams, EzmockSetup};
use crate::domain::{PipelineError, PipelineResult};
use crate::modules::external::ExternalProgram;
use crate::modules::serialization::ensure_parent_dir;
use crate::modules::traits::EzmockEngine;
use std::path::Path;

/// EZmock driven through an external program's `populate` subcommand.
#[derive(Debug, Clone)]
pub struct CommandEzmock {
    program: ExternalProgram,
}

impl CommandEzmock {
    pub fn new(program: ExternalProgram) -> Self {
        Self { program }
    }
}

impl EzmockEngine for CommandEzmock {
    fn populate_tracer_to_file(
        &self,
        setup: &EzmockSetup,
        params: &EzmockParams,
        ntracer: usize,
        rsd_factor: f64,
        output: &Path,
    ) -> PipelineResult<()> {
        ensure_parent_dir(output)?;
        let growth = &setup.growth;
        let mut command = self.program.command();
        command
            .arg("populate")
            .arg("--lbox")
            .arg(setup.lbox.to_string())
            .arg("--ngrid")
            .arg(setup.ngrid.to_string())
            .arg("--seed")
            .arg(&setup.seed)
            .arg("--nthread")
            .arg(setup.nthread.to_string())
            .arg("--z-out")
            .arg(growth.z_out.to_string())
            .arg("--z-pk")
            .arg(growth.z_pk.to_string())
            .arg("--omega-m")
            .arg(growth.omega_m.to_string())
            .arg("--omega-nu")
            .arg(growth.omega_nu.to_string())
            .arg("--dx")
            .arg(&setup.displacement.dx)
            .arg("--dy")
            .arg(&setup.displacement.dy)
            .arg("--dz")
            .arg(&setup.displacement.dz)
            .arg("--rho-c")
            .arg(params.rho_c.to_string())
            .arg("--rho-exp")
            .arg(params.rho_exp.to_string())
            .arg("--pdf-base")
            .arg(params.pdf_base.to_string())
            .arg("--sigma-v")
            .arg(params.sigma_v.to_string())
            .arg("--ntracer")
            .arg(ntracer.to_string())
            .arg("--rsd-factor")
            .arg(rsd_factor.to_string())
            .arg("--output")
            .arg(output);
        self.program.run_captured(&mut command, "RUN.EZMOCK")?;

        if !output.is_file() {
            return Err(PipelineError::external_process(
                "RUN.EZMOCK_OUTPUT",
                format!("EZmock finished without writing '{}'", output.display()),
            ));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::CommandEzmock;
    use crate::modules::external::ExternalProgram;
    use crate::modules::ezmock::{EzmockParams, EzmockSetup, GrowthParams};
    use crate::modules::traits::EzmockEngine;
    use std::fs;
    use tempfile::TempDir;

    const FAKE_EZMOCK: &str = r#"
out=""; args="$*"
while [ $# -gt 0 ]; do
  [ "$1" = --output ] && out="$2"
  shift
done
printf '# %s\n1 2 3\n' "$args" > "$out"
"#;

    fn setup(temp: &TempDir) -> EzmockSetup {
        for axis in ["x", "y", "z"] {
            fs::write(temp.path().join(format!("d{axis}_s1.txt")), "0\n")
                .expect("fixture should be written");
        }
        EzmockSetup::new(1000.0, 256, "s1", 8, GrowthParams::new(3.0), temp.path())
            .expect("setup should succeed")
    }

    #[test]
    fn populate_passes_setup_and_parameters() {
        let temp = TempDir::new().expect("tempdir should be created");
        let setup = setup(&temp);
        let engine = CommandEzmock::new(
            ExternalProgram::new("/bin/sh").with_args(["-c", FAKE_EZMOCK, "ezmock"]),
        );
        let output = temp.path().join("out/mock.dat");
        let params = EzmockParams::parse("0,3,0.48,400").expect("params should parse");

        engine
            .populate_tracer_to_file(&setup, &params, 1000, 0.01, &output)
            .expect("populate should succeed");

        let text = fs::read_to_string(&output).expect("catalog should be written");
        assert!(text.contains("populate --lbox 1000 --ngrid 256 --seed s1 --nthread 8"));
        assert!(text.contains("--pdf-base 0.48 --sigma-v 400 --ntracer 1000 --rsd-factor 0.01"));
    }

    #[test]
    fn missing_output_is_an_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let setup = setup(&temp);
        let engine =
            CommandEzmock::new(ExternalProgram::new("/bin/sh").with_args(["-c", "true", "ezmock"]));
        let params = EzmockParams::parse("0,3,0.48,400").expect("params should parse");

        let error = engine
            .populate_tracer_to_file(&setup, &params, 10, 0.01, &temp.path().join("none.dat"))
            .expect_err("missing output should fail");
        assert_eq!(error.code(), "RUN.EZMOCK_OUTPUT");
    }
}
