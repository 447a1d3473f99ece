use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use env_logger::Env;
use structopt::StructOpt;
use wpsync::{context::Context, run};
use wpsync_core::config::AppConfig;

#[derive(StructOpt, Debug)]
#[structopt(name = "wpsync", about = "Mirror Wordpress sites content into GitHub repositories")]
struct Opt {
    /// Config file (default is ~/.wpsync.conf)
    #[structopt(long = "config", parse(from_os_str))]
    config_file_path: Option<PathBuf>,

    /// Endpoints file, override config
    #[structopt(long, parse(from_os_str))]
    endpoints_file: Option<PathBuf>,

    /// Only sync endpoint with this name (can be repeated)
    #[structopt(long)]
    endpoint: Vec<String>,

    /// Use endpoints enabled for local runs and return errors instead of
    /// reporting them
    #[structopt(long)]
    debug: bool,

    /// Run again every given seconds instead of exiting after one pass
    #[structopt(long)]
    interval: Option<u64>,
}

impl Opt {
    fn to_context(&self) -> Result<Context> {
        let mut config = AppConfig::from_env(self.config_file_path.clone())?;
        if let Some(endpoints_file) = &self.endpoints_file {
            config.endpoints_file = endpoints_file.clone();
        }
        if self.debug {
            config.debug = true;
        }
        if let Some(interval) = self.interval {
            config.interval = Some(Duration::from_secs(interval));
        }

        Ok(Context::new(config, self.endpoint.clone()))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let context = opt.to_context()?;
    run::run(context)?;
    log::info!("Exit application");
    Ok(())
}
