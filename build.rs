// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builds the objc trampoline when the `objc` feature is on and we target an apple platform.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(catchr_objc)");
    #[cfg(feature = "objc")]
    objc();
}

#[cfg(feature = "objc")]
fn objc() {
    println!("cargo:rerun-if-changed=objc/exception.m");
    //cfg(target_vendor) in a build script describes the host, not the target
    let vendor = std::env::var("CARGO_CFG_TARGET_VENDOR").unwrap_or_default();
    if vendor != "apple" {
        println!("cargo:warning=catchr: the objc feature only does something on apple targets");
        return;
    }
    cc::Build::new()
        .file("objc/exception.m")
        .flag("-fobjc-exceptions")
        //we retain/release by hand on the Rust side
        .flag("-fno-objc-arc")
        .compile("catchr_exception");
    println!("cargo:rustc-link-lib=framework=Foundation");
    println!("cargo:rustc-link-lib=objc");
    println!("cargo:rustc-cfg=catchr_objc");
}
