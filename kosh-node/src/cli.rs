use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "kosh-node", about = "Kosh transactional core service")]
pub struct Args {
    /// Listen port; overrides SERVICE_PORT.
    #[arg(long)]
    pub port: Option<u16>,

    /// Skip seeding the system chart and built-in roles at boot.
    #[arg(long, default_value_t = false)]
    pub no_seed: bool,
}
