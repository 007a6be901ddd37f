pub mod dns;

pub use dns::{create_resolver, HickoryResolver, Resolution, Resolver, StaticResolver};
