//! 基础设施层 - tmux、git worktree

pub mod git;
pub mod tmux;

pub use git::WorktreeManager;
pub use tmux::TmuxManager;
