//! The `regions` subcommand: list the regions a build would process.

use std::path::PathBuf;

use clap::Args;

use tilesmith::pipeline::{builtin_regions, load_regions_file, Region};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct RegionsArgs {
    /// Region definition file (JSON); defaults to the built-in set
    #[arg(long)]
    pub regions: Option<PathBuf>,
}

pub fn run(args: RegionsArgs) -> Result<(), CliError> {
    let regions = match &args.regions {
        Some(path) => load_regions_file(path)?,
        None => builtin_regions(),
    };

    print_regions(&regions);
    Ok(())
}

fn print_regions(regions: &[Region]) {
    println!("{:<16} {:<16} SOURCE", "SLUG", "NAME");
    for region in regions {
        println!("{:<16} {:<16} {}", region.slug, region.name, region.url);
    }
    println!();
    println!("{} region(s)", regions.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_listing_is_default() {
        let args = RegionsArgs { regions: None };
        assert!(run(args).is_ok());
    }

    #[test]
    fn test_missing_region_file_is_error() {
        let args = RegionsArgs {
            regions: Some(PathBuf::from("/nonexistent/regions.json")),
        };
        assert!(run(args).is_err());
    }
}
