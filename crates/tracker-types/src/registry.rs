//! Registry trait for self-registering implementations.
//!
//! Store backends and order sources are selected by name from the
//! configuration. Each implementation module exposes a `Registry` struct
//! implementing [`ImplementationRegistry`] that ties the name to a factory.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. `"memory"` for
	/// `[store.implementations.memory]` or `"file"` for
	/// `[source.implementations.file]`.
	const NAME: &'static str;

	/// Factory function type of the owning module (`StoreFactory`,
	/// `SourceFactory`).
	type Factory;

	/// Returns the factory that builds this implementation from its TOML table.
	fn factory() -> Self::Factory;
}
