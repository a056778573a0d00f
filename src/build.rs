//! create a new, empty MiniVSFS image
use std::path::Path;

use byte_unit::Byte;
use log::info;

use crate::fs::{Image, Result, BLOCK_SIZE};
use crate::utils::{geometry, time_util};

/// create a fresh image containing only the root directory
/// # Params
/// - `image_path`: where the image file is written (overwritten if present)
/// - `size_kib`: total image size in KiB, validated by [geometry::compute]
/// - `inode_count`: number of inodes, validated by [geometry::compute]
/// # Return
/// a [Result] to indicate whether the operation is successful; on a
/// validation failure nothing is written
pub fn build<P>(image_path: P, size_kib: u64, inode_count: u64) -> Result<()>
where
    P: AsRef<Path>,
{
    let image_path = image_path.as_ref();
    let geo = geometry::compute(size_kib, inode_count)?;

    // use `users` crate to get the uid and gid of this program
    let uid = users::get_effective_uid();
    let gid = users::get_effective_gid();
    let now = time_util::now_epoch();

    // the whole image is constructed in memory before any byte reaches disk
    let mut img = Image::format(&geo, uid, gid, now);
    img.save(image_path)?;

    info!(
        "wrote {} image ({} data blocks) to {}",
        Byte::from_bytes((geo.total_blocks * BLOCK_SIZE as u64) as _).get_appropriate_unit(true),
        geo.data_region_blocks,
        image_path.display()
    );
    println!(
        "created image '{}' with {} blocks, {} inodes",
        image_path.display(),
        geo.total_blocks,
        geo.inode_count
    );
    Ok(())
}
