use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_DYNAMIC");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");

    // Only the `ffmpeg` feature links against FFmpeg.
    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        return;
    }

    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let vcpkg_root = match env::var("VCPKG_ROOT") {
        Ok(value) => value,
        Err(_) => {
            println!(
                "cargo:warning=stillframe: building with `--features ffmpeg` on Windows but neither FFMPEG_DIR nor VCPKG_ROOT is set; the FFmpeg session and stillframe-cli will fail to link."
            );
            return;
        }
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);

    if ffmpeg_dir.exists() {
        println!(
            "cargo:warning=stillframe: using vcpkg FFmpeg at {}; export FFMPEG_DIR={} to pin it for stillframe's FFmpeg session.",
            ffmpeg_dir.display(),
            ffmpeg_dir.display(),
        );
        if env::var_os("VCPKGRS_DYNAMIC").is_none() {
            println!(
                "cargo:warning=stillframe: set VCPKGRS_DYNAMIC=1 if stillframe-cli should load FFmpeg DLLs at runtime."
            );
        }
    } else {
        println!(
            "cargo:warning=stillframe: `--features ffmpeg` needs FFmpeg under {}; run `vcpkg install ffmpeg` for that triplet.",
            ffmpeg_dir.display(),
        );
    }
}
