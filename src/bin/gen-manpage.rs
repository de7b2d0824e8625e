//! Man page generator for hubflash
//!
//! Writes `hubflash.1` plus one `hubflash-<command>.1` page per subcommand,
//! in the style of git's split man pages.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::{Command, CommandFactory};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

// Only the transport listing is used here
#[allow(dead_code)]
#[path = "../transports.rs"]
mod transports;

fn write_page(cmd: Command, dir: &Path, name: &str) -> io::Result<PathBuf> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd).render(&mut buffer)?;
    let path = dir.join(format!("{}.1", name));
    fs::write(&path, buffer)?;
    Ok(path)
}

fn main() -> io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let mut cmd = cli::Cli::command().after_long_help(transports::transport_help());
    cmd.build();

    let mut pages = vec![write_page(cmd.clone(), &output_dir, "hubflash")?];
    for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
        let name = format!("hubflash-{}", sub.get_name());
        let page = sub.clone().display_name(name.clone());
        pages.push(write_page(page, &output_dir, &name)?);
    }

    for page in &pages {
        println!("Generated {}", page.display());
    }
    println!("\nView with: man -l {}", pages[0].display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut cmd = cli::Cli::command();
        cmd.build();
        let flash = cmd.find_subcommand("flash").unwrap().clone();
        let path = write_page(flash.display_name("hubflash-flash"), dir.path(), "hubflash-flash")
            .unwrap();

        assert_eq!(path, dir.path().join("hubflash-flash.1"));
        let page = fs::read_to_string(&path).unwrap();
        assert!(page.contains("Flash firmware to a hub in bootloader mode"));
        assert!(page.contains("bundled"));
    }
}
