use clap::Args;

use super::CliContext;
use greentic_plaid::schema::write_schema;

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Output directory, defaults to `<root>/schemas`
    #[arg(long)]
    pub out_dir: Option<std::path::PathBuf>,
}

pub async fn execute(args: SchemaArgs, context: &CliContext) -> anyhow::Result<()> {
    let out_dir = args.out_dir.unwrap_or_else(|| context.root.join("schemas"));
    for name in write_schema(&out_dir)? {
        println!("  {name}");
    }
    println!("Schemas written to {}", out_dir.display());
    Ok(())
}
