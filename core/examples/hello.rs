//! Minimal embedding: evaluate an expression and read the result back
//!
//! Run with `cargo run --example hello`.

use hostbridge_core::Context;

fn main() -> anyhow::Result<()> {
    let ctx = Context::new()?;
    let value = ctx.execute("'hello ' + 'world'")?;
    let greeting: String = ctx.export_as(&value)?;
    println!("Got: [{}]", greeting);
    Ok(())
}
