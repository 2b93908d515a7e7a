//! Motion of glued entities.

use crate::scene::{Flags, Glue, Motion, Transform};

/// Makes every glued entity follow its parent: same velocity, and a new
/// position that preserves the current offset from the parent. Runs after
/// integration so parent `new_position`s are current. Glue chains are not
/// resolved; the parent of a glued entity must not itself be glued.
pub fn update_glued_motion(
    transforms: &[Transform],
    glue: &[Glue],
    flags: &[Flags],
    motion: &mut [Motion],
) {
    for i in 0..transforms.len() {
        if !flags[i].contains(Flags::GLUED) {
            continue;
        }
        let parent = glue[i].parent_id.index();
        motion[i].velocity = motion[parent].velocity;
        motion[i].new_position =
            motion[parent].new_position + (transforms[i].position - transforms[parent].position);
    }
}
