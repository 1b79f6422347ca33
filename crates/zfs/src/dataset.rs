//! Argument vectors for the `zfs` command.

use crate::volume::Volume;
use csi_command_utils::Args;
use smallvec::smallvec;

pub const ZFS_CREATE_ARG: &str = "create";
pub const ZFS_DESTROY_ARG: &str = "destroy";

/// `create -o quota=<size> [-o dedup=<d>] [-o compression=<c>] <pool>/<name>`
///
/// Option order is fixed so identical volumes always produce identical
/// command lines. Empty dedup or compression leaves the property unset.
pub fn build_create_args(volume: &Volume) -> Args {
  let mut args: Args = smallvec![ZFS_CREATE_ARG.to_owned()];

  args.push("-o".into());
  args.push(format!("quota={}", volume.size()));

  if !volume.dedup().is_empty() {
    args.push("-o".into());
    args.push(format!("dedup={}", volume.dedup()));
  }

  if !volume.compression().is_empty() {
    args.push("-o".into());
    args.push(format!("compression={}", volume.compression()));
  }

  args.push(volume.dataset());
  args
}

/// `destroy -R <pool>/<name>`. The recursive flag removes every descendant
/// dataset and snapshot along with the target.
pub fn build_destroy_args(volume: &Volume) -> Args {
  smallvec![
    ZFS_DESTROY_ARG.to_owned(),
    "-R".to_owned(),
    volume.dataset()
  ]
}
