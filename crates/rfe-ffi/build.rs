use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let header = crate_dir.join("include").join("rfe.h");

    println!("cargo:rerun-if-changed=src/lib.rs");

    let mut config = cbindgen::Config::default();
    config.language = cbindgen::Language::C;
    config.include_guard = Some("rfe_h".into());
    config.cpp_compat = true;
    config.documentation = true;
    config.enumeration = cbindgen::EnumConfig {
        rename_variants: cbindgen::RenameRule::ScreamingSnakeCase,
        prefix_with_name: true,
        ..Default::default()
    };

    match cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) => {
            bindings.write_to_file(header);
        }
        // The checked-in header is used as-is.
        Err(e) => println!("cargo:warning=cbindgen: {e}"),
    }
}
