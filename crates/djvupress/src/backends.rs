use djvupress_backend::BackendRegistry;

/// Build the process-wide backend registry. Registration order is the order
/// shown to users, and the first entry is the default backend when none is
/// configured.
pub fn default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(djvupress_djvulibre::backend());
    registry.register(djvupress_pdf2djvu::backend());
    registry
}
