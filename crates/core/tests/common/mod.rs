use portico_core::module::CatalogBackend;
use portico_core::package::HostRuntime;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `<root>/<name>.ppkg` holding a catalog manifest for `module` under
/// the payload group of the current runtime.
pub fn write_catalog_package(root: &Path, name: &str, module: &str) -> PathBuf {
    let target = HostRuntime::current().target();
    let path = root.join(format!("{name}.ppkg"));
    let file = File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    zip.start_file(format!("lib/{target}/{module}.pmod"), options)
        .unwrap();
    zip.write_all(CatalogBackend::manifest_contents(module).as_bytes())
        .unwrap();
    zip.start_file(format!("lib/{target}/{module}.xml"), options)
        .unwrap();
    zip.write_all(b"<doc/>").unwrap();

    zip.finish().unwrap();
    path
}
