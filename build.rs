use std::env;
use std::path::PathBuf;

// ffmpeg-sys-next finds FFmpeg through pkg-config everywhere except
// Windows, where a vcpkg install must be pointed at explicitly.
fn main() {
    for variable in ["FFMPEG_DIR", "VCPKG_ROOT", "VCPKGRS_DYNAMIC", "VCPKGRS_TRIPLET"] {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows"
        || env::var_os("FFMPEG_DIR").is_some()
    {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=thumbframe: FFMPEG_DIR is not set; install FFmpeg (with libvpx for WebM alpha) via vcpkg and set FFMPEG_DIR."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let install = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if install.exists() {
        println!(
            "cargo:warning=thumbframe: found vcpkg FFmpeg at {0}; set FFMPEG_DIR={0} to use it.",
            install.display()
        );
    } else {
        println!(
            "cargo:warning=thumbframe: VCPKG_ROOT is set but {} does not exist.",
            install.display()
        );
    }
}
