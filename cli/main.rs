#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::error::Error;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use malecot::compare::compare_models_observed;
use malecot::config::{PriorConfig, RunConfig};
use malecot::data::{CoordinateMode, PairwiseData};
use malecot::identity::ModelKind;
use malecot::inference::CancellationToken;
use malecot::prior::LogNormalPrior;
use malecot::progress::SamplingProgress;
use malecot::report::{write_marker_summaries, write_outputs, write_pairwise_table};

#[derive(Parser)]
#[command(
    name = "malecot",
    about = "Bayesian inference of neighborhood size and density from pairwise genetic identity",
    long_about = "Estimates Wright's neighborhood size and population density from georeferenced \
                 microsatellite genotypes under the Wright-Malecot isolation-by-distance model, \
                 using MCMC over log-normal priors."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample the posterior of neighborhood size and density
    #[command(about = "Run the sampler (outputs: PREFIX.csv, PREFIX.summary.csv)")]
    Run(RunArgs),

    /// Print the pairwise table and marker summaries of an input file
    #[command(about = "Print pairwise distances, identity counts and marker summaries as CSV")]
    Pairs(PairsArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Input table: a header row, then one row per individual with id, two
    /// coordinates and one a/b genotype per marker
    #[arg(value_name = "DATA")]
    data: PathBuf,

    /// TOML run configuration; command-line values take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Prefix of the output files
    #[arg(long, value_name = "PREFIX", default_value = "malecot")]
    out: PathBuf,

    #[arg(long, value_enum)]
    coordinates: Option<CoordinateMode>,

    #[arg(long, value_name = "RATE")]
    mutation_rate: Option<f64>,

    #[arg(long, value_name = "NB")]
    nb_start: Option<f64>,

    #[arg(long, value_name = "DENSITY")]
    density_start: Option<f64>,

    #[arg(long, value_name = "N")]
    iterations: Option<usize>,

    #[arg(long, value_name = "N")]
    burn_in: Option<usize>,

    #[arg(long, value_name = "N")]
    thin: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Also fit the distance-free null model and compare DIC
    #[arg(long)]
    model_comparison: bool,

    /// Record a binomial replicate of the counts at every retained state
    #[arg(long)]
    posterior_predictive: bool,

    #[arg(long, value_name = "LEVEL")]
    credible_level: Option<f64>,

    /// Location of the log-normal prior on neighborhood size
    #[arg(long, value_name = "MU", allow_hyphen_values = true)]
    nb_prior_mu: Option<f64>,

    /// Precision of the log-normal prior on neighborhood size
    #[arg(long, value_name = "TAU")]
    nb_prior_tau: Option<f64>,

    /// Location of the log-normal prior on density
    #[arg(long, value_name = "MU", allow_hyphen_values = true)]
    density_prior_mu: Option<f64>,

    /// Precision of the log-normal prior on density
    #[arg(long, value_name = "TAU")]
    density_prior_tau: Option<f64>,
}

#[derive(Args)]
struct PairsArgs {
    #[arg(value_name = "DATA")]
    data: PathBuf,

    #[arg(long, value_enum, default_value_t = CoordinateMode::Planar)]
    coordinates: CoordinateMode,
}

impl RunArgs {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_to(&self, config: &mut RunConfig) -> Result<(), String> {
        if let Some(mode) = self.coordinates {
            config.coordinates = mode;
        }
        if let Some(rate) = self.mutation_rate {
            config.mutation_rate = rate;
        }
        if let Some(nb) = self.nb_start {
            config.nb_start = nb;
        }
        if let Some(density) = self.density_start {
            config.density_start = density;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(burn_in) = self.burn_in {
            config.burn_in = burn_in;
        }
        if let Some(thin) = self.thin {
            config.thin = thin;
        }
        if let Some(level) = self.credible_level {
            config.credible_level = level;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.model_comparison |= self.model_comparison;
        config.posterior_predictive |= self.posterior_predictive;

        if let Some(priors) = config.priors.as_mut() {
            if let Some(mu) = self.nb_prior_mu {
                priors.nb.mu = mu;
            }
            if let Some(tau) = self.nb_prior_tau {
                priors.nb.tau = tau;
            }
            if let Some(mu) = self.density_prior_mu {
                priors.density.mu = mu;
            }
            if let Some(tau) = self.density_prior_tau {
                priors.density.tau = tau;
            }
            return Ok(());
        }

        match [
            self.nb_prior_mu,
            self.nb_prior_tau,
            self.density_prior_mu,
            self.density_prior_tau,
        ] {
            [Some(nb_mu), Some(nb_tau), Some(density_mu), Some(density_tau)] => {
                config.priors = Some(PriorConfig {
                    nb: LogNormalPrior {
                        mu: nb_mu,
                        tau: nb_tau,
                    },
                    density: LogNormalPrior {
                        mu: density_mu,
                        tau: density_tau,
                    },
                });
                Ok(())
            }
            given if given.iter().any(Option::is_some) => Err(
                "Without priors in the configuration file, all of --nb-prior-mu, --nb-prior-tau, \
                 --density-prior-mu and --density-prior-tau are required."
                    .to_string(),
            ),
            _ => Ok(()),
        }
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    let style = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Drives one progress bar per sampled model.
#[derive(Default)]
struct ProgressBarObserver {
    bar: Option<ProgressBar>,
}

impl SamplingProgress for ProgressBarObserver {
    fn on_start(&mut self, model: ModelKind, total_iterations: usize) {
        self.bar = Some(create_progress_bar(
            total_iterations as u64,
            &format!("{model} model"),
        ));
    }

    fn on_advance(&mut self, completed_iterations: usize) {
        if let Some(bar) = &self.bar {
            bar.set_position(completed_iterations as u64);
        }
    }

    fn on_finish(&mut self, model: ModelKind) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(format!("{model} model done"));
        }
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    args.apply_to(&mut config)?;
    config.validate()?;

    let data = PairwiseData::from_path(&args.data, config.coordinates)?;
    let mut progress = ProgressBarObserver::default();
    let comparison = compare_models_observed(
        &data,
        &config,
        config.model_comparison,
        &mut progress,
        &CancellationToken::new(),
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for summary in comparison.full.summaries(config.credible_level)? {
        writeln!(
            out,
            "{:>8}  mean {:.4}  sd {:.4}  median {:.4}  {:.0}% CI [{:.4}, {:.4}]  HPD [{:.4}, {:.4}]",
            summary.quantity.column(),
            summary.mean,
            summary.std_dev,
            summary.median,
            summary.level * 100.0,
            summary.credible_interval.0,
            summary.credible_interval.1,
            summary.hpd_interval.0,
            summary.hpd_interval.1,
        )?;
    }
    if let Some(info) = comparison.full.deviance_information() {
        writeln!(out, "DIC {:.3} (pD {:.3})", info.dic, info.effective_parameters)?;
    }
    if comparison.null.is_some() {
        write!(out, "{}", comparison.report())?;
    }

    let paths = write_outputs(&args.out, &comparison, config.credible_level)?;
    writeln!(out, "Trace written to {}", paths.trace.display())?;
    Ok(())
}

fn pairs(args: PairsArgs) -> Result<(), Box<dyn Error>> {
    let data = PairwiseData::from_path(&args.data, args.coordinates)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_pairwise_table(&mut out, &data)?;
    writeln!(out)?;
    write_marker_summaries(&mut out, &data)?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Pairs(args)) => pairs(args),
        None => Cli::command()
            .print_help()
            .map_err(|e| Box::new(e) as Box<dyn Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
