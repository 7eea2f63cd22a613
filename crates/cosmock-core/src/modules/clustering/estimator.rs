use super::{
    Bispectrum, BispectrumConfig, CorrelationConfig, CorrelationFunction, PowerSpectrum,
    PowerSpectrumConfig,
};
use crate::domain::{PipelineResult, Positions};
use crate::modules::compare::{FftPowerConfig, PowerPoles};
use crate::modules::external::{ExternalProgram, ScratchDir, join_list, write_positions};
use crate::modules::serialization::NamedTable;
use crate::modules::traits::{
    BispectrumEstimator, CorrelationEstimator, MultipoleEstimator, PowerSpectrumEstimator,
};
use std::process::Command;

/// Clustering estimators behind one external program with `powspec`,
/// `corrfunc`, `bispec` and `poles` subcommands. Each call hands over an
/// `x y z` file via `--input` and reads back the named-column table the
/// program writes to `--output`.
#[derive(Debug, Clone)]
pub struct CommandEstimator {
    program: ExternalProgram,
}

impl CommandEstimator {
    pub fn new(program: ExternalProgram) -> Self {
        Self { program }
    }

    fn run(
        &self,
        subcommand: &str,
        positions: &Positions,
        configure: impl FnOnce(&mut Command),
    ) -> PipelineResult<NamedTable> {
        let scratch = ScratchDir::new(subcommand)?;
        let input = scratch.join("positions.txt");
        let output = scratch.join("result.txt");
        write_positions(&input, positions)?;

        let mut command = self.program.command();
        command
            .arg(subcommand)
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output);
        configure(&mut command);
        self.program.run_captured(&mut command, "RUN.ESTIMATOR")?;
        NamedTable::read(&output)
    }
}

impl PowerSpectrumEstimator for CommandEstimator {
    fn powspec_box(
        &self,
        positions: &Positions,
        config: &PowerSpectrumConfig,
    ) -> PipelineResult<PowerSpectrum> {
        let table = self.run("powspec", positions, |command| {
            command
                .arg("--ngrid")
                .arg(config.ngrid.to_string())
                .arg("--lbox")
                .arg(config.lbox.to_string())
                .arg("--kmin")
                .arg(config.kmin.to_string())
                .arg("--kmax")
                .arg(config.kmax.to_string())
                .arg("--nbin")
                .arg(config.nbin.to_string())
                .arg("--ells")
                .arg(join_ells(&config.ells))
                .arg("--assign")
                .arg(config.assign.as_str())
                .arg("--ncpu")
                .arg(config.ncpu.to_string());
            if config.interlace {
                command.arg("--interlace");
            }
        })?;
        Ok(PowerSpectrum {
            kcen: table.column("kcen")?,
            kmin: table.column("kmin")?,
            kmax: table.column("kmax")?,
            kavg: table.column("kavg")?,
            nmode: table.column("nmod")?,
            p0: table.column("P_0")?,
            p2: table.column("P_2")?,
            p4: table.optional_column("P_4")?,
        })
    }
}

impl CorrelationEstimator for CommandEstimator {
    fn compute_cf(
        &self,
        positions: &Positions,
        config: &CorrelationConfig,
    ) -> PipelineResult<CorrelationFunction> {
        let table = self.run("corrfunc", positions, |command| {
            command
                .arg("--s-edges")
                .arg(join_list(&config.s_edges))
                .arg("--nmu")
                .arg(config.nmu.to_string())
                .arg("--conf")
                .arg(&config.conf);
        })?;
        Ok(CorrelationFunction {
            s: table.column("s")?,
            smin: table.column("smin")?,
            smax: table.column("smax")?,
            xi0: table.column("xi0")?,
            xi2: table.column("xi2")?,
        })
    }
}

impl BispectrumEstimator for CommandEstimator {
    fn bispec_box(
        &self,
        positions: &Positions,
        config: &BispectrumConfig,
    ) -> PipelineResult<Bispectrum> {
        let table = self.run("bispec", positions, |command| {
            command
                .arg("--ngrid")
                .arg(config.ngrid.to_string())
                .arg("--lbox")
                .arg(config.lbox.to_string())
                .arg("--k1")
                .arg(config.k1.to_string())
                .arg("--dk1")
                .arg(config.dk1.to_string())
                .arg("--k2")
                .arg(config.k2.to_string())
                .arg("--dk2")
                .arg(config.dk2.to_string())
                .arg("--nbin")
                .arg(config.nbin.to_string())
                .arg("--assign")
                .arg(config.assign.as_str())
                .arg("--ncpu")
                .arg(config.ncpu.to_string());
            if config.interlace {
                command.arg("--interlace");
            }
        })?;
        Ok(Bispectrum {
            theta: table.column("theta")?,
            theta_mean: table.column("theta_mean")?,
            k3: table.column("k3")?,
            modes: table.column("modes")?,
            b: table.column("B")?,
            q: table.column("Q")?,
        })
    }
}

impl MultipoleEstimator for CommandEstimator {
    fn power_poles(
        &self,
        positions: &Positions,
        config: &FftPowerConfig,
    ) -> PipelineResult<PowerPoles> {
        let table = self.run("poles", positions, |command| {
            command
                .arg("--boxsize")
                .arg(config.lbox.to_string())
                .arg("--nmesh")
                .arg(config.nmesh.to_string())
                .arg("--k-edges")
                .arg(join_list(&config.k_edges))
                .arg("--mu-bins")
                .arg(config.mu_bins.to_string())
                .arg("--ells")
                .arg(join_ells(&config.ells))
                .arg("--resampler")
                .arg(config.resampler.as_str())
                .arg("--interlacing")
                .arg(config.interlacing.to_string())
                .arg("--los")
                .arg(config.los.to_string());
        })?;
        Ok(PowerPoles {
            k: table.column("k")?,
            p0: table.column("P0")?,
            p2: table.column("P2")?,
        })
    }
}

fn join_ells(ells: &[u32]) -> String {
    ells.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(all(test, unix))]
mod tests {
    use super::CommandEstimator;
    use crate::domain::Positions;
    use crate::modules::clustering::{CorrelationConfig, PowerSpectrumConfig};
    use crate::modules::external::ExternalProgram;
    use crate::modules::traits::{CorrelationEstimator, PowerSpectrumEstimator};
    use std::path::PathBuf;

    // Echoes the argument list into the first table column so tests can see it.
    const FAKE_ESTIMATOR: &str = r#"
cmd="$1"; shift
out=""; input=""; args="$*"
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2" ;;
    --input) input="$2" ;;
  esac
  shift
done
rows=$(wc -l < "$input" | tr -d ' ')
case "$cmd" in
  powspec)
    printf '# %s\n# kcen kmin kmax kavg nmod P_0 P_2\n0.01 0 0.02 0.011 12 %s 5\n' "$args" "$rows" > "$out" ;;
  corrfunc)
    printf '# s smin smax xi0 xi2\n2.5 0 5 0.3 -0.1\n' > "$out" ;;
  *)
    exit 9 ;;
esac
"#;

    fn estimator() -> CommandEstimator {
        CommandEstimator::new(
            ExternalProgram::new("/bin/sh").with_args(["-c", FAKE_ESTIMATOR, "catinbox"]),
        )
    }

    fn positions() -> Positions {
        Positions::from_columns(vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0])
            .expect("positions should build")
    }

    #[test]
    fn power_spectrum_table_is_read_by_column_name() {
        let pk = estimator()
            .powspec_box(&positions(), &PowerSpectrumConfig::new(0.0, 0.3, 30, 4))
            .expect("powspec should succeed");

        assert_eq!(pk.kcen, vec![0.01]);
        assert_eq!(pk.nmode, vec![12.0]);
        assert_eq!(pk.p0, vec![2.0], "estimator should see both positions");
        assert_eq!(pk.p4, None);
    }

    #[test]
    fn correlation_table_is_parsed() {
        let config = CorrelationConfig {
            s_edges: vec![0.0, 5.0],
            nmu: 100,
            conf: PathBuf::from("conf/fcfc_ref.conf"),
        };
        let xi = estimator()
            .compute_cf(&positions(), &config)
            .expect("corrfunc should succeed");
        assert_eq!(xi.s, vec![2.5]);
        assert_eq!(xi.xi2, vec![-0.1]);
    }
}
