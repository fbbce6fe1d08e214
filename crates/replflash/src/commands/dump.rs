//! Dump command implementation

use clap::Args;
use miette::{IntoDiagnostic, Result};

use super::Context;
use crate::remote::{RemotePath, Session, read_chunks};

/// Bytes shown per line
const LINE_WIDTH: usize = 16;

/// Arguments for the dump command
#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Remote file to show
    pub path: String,
}

/// Run the dump command
pub fn run(ctx: &Context, args: DumpArgs) -> Result<()> {
    let path = RemotePath::parse(&args.path);

    let mut repl = ctx.open_device().into_diagnostic()?;
    let mut session = Session::open(&mut repl).into_diagnostic()?;

    let mut offset = 0;
    read_chunks(&mut session, &path, LINE_WIDTH, |chunk| {
        println!("{}", hex_line(offset, chunk));
        offset += chunk.len();
    })
    .into_diagnostic()?;
    println!("{} bytes", offset);

    session.close().into_diagnostic()?;
    Ok(())
}

/// One line of a hex dump: offset, hex bytes, printable characters
pub fn hex_line(offset: usize, chunk: &[u8]) -> String {
    let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
    let ascii: String = chunk
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect();
    format!(
        "{:08x}  {:<width$}  |{}|",
        offset,
        hex.join(" "),
        ascii,
        width = LINE_WIDTH * 3 - 1
    )
}
