mod app;

use anyhow::Result;
use clap::Parser;

use crate::app::{App, Args};

fn main() -> Result<()> {
    let mut app = App::new(Args::parse());
    app.init()?;

    Ok(())
}
