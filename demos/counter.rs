//! Two counters sharing one store.
//!
//! Run with `RUST_LOG=tandem=debug cargo run --example counter` to watch the
//! relay and the scheduler at work.

use tandem::{Mount, Runtime, Store, UseStore};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq)]
struct Cart {
    items: Vec<String>,
}

#[derive(Clone, Debug)]
enum CartArg {
    Add(String),
    Remove(usize),
    None,
}

fn render(label: &'static str, store: Store<Cart, CartArg>) -> Mount<UseStore<Cart, CartArg>> {
    Mount::new(move || {
        let used = store.use_store()?;
        println!("   [{label}] {} item(s): {:?}", used.0.items.len(), used.0.items);
        Ok(used)
    })
}

fn main() -> tandem::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Shared Cart ===\n");

    Runtime::scope(|| {
        let runtime = Runtime::current();
        let store: Store<Cart, CartArg> = Store::builder(Cart { items: Vec::new() })
            .action("add", |cart: &Cart, arg: CartArg| match arg {
                CartArg::Add(item) => {
                    let mut items = cart.items.clone();
                    items.push(item);
                    Cart { items }
                }
                _ => cart.clone(),
            })
            .action("remove", |cart: &Cart, arg: CartArg| match arg {
                CartArg::Remove(index) if index < cart.items.len() => {
                    let mut items = cart.items.clone();
                    items.remove(index);
                    Cart { items }
                }
                _ => cart.clone(),
            })
            .action("clear", |_: &Cart, _: CartArg| Cart { items: Vec::new() })
            .listener(|cart| println!("   [listener] cart now holds {}", cart.items.len()))
            .build();

        println!("1. Mounting header and sidebar");
        let header = render("header", store.clone());
        let sidebar = render("sidebar", store.clone());
        runtime.flush()?;

        println!("\n2. Header adds two items");
        let (_, _, actions) = header.output().expect("header rendered");
        actions.dispatch("add", CartArg::Add("tea".into()))?;
        actions.dispatch("add", CartArg::Add("biscuits".into()))?;
        runtime.flush()?;

        println!("\n3. Sidebar removes the first item");
        let (_, _, actions) = sidebar.output().expect("sidebar rendered");
        actions.dispatch("remove", CartArg::Remove(0))?;
        runtime.flush()?;

        println!("\n4. Header unmounts, sidebar clears the cart");
        header.unmount();
        actions.dispatch("clear", CartArg::None)?;
        runtime.flush()?;

        println!("\nFinal cart: {:?}", store.get());
        Ok(())
    })
}
