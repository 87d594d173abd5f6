use std::io::Read;

use anyhow::Context;
use errcat_catalog::{ErrorCatalog, MessageResolver};

use crate::cli::args::ResolveArgs;
use crate::exit_codes::SUCCESS;

pub async fn run(catalog: &ErrorCatalog, args: ResolveArgs) -> anyhow::Result<i32> {
    let body = if args.payload == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        buf
    } else {
        args.payload
    };

    let resolver = MessageResolver::new(catalog.clone());
    let message = resolver
        .resolve_body(body.trim(), args.fallback.as_deref())
        .await;
    println!("{}", message);
    Ok(SUCCESS)
}
