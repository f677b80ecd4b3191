pub mod baseline;
pub mod direction;
pub mod executor;
pub mod filter;
pub mod hierarchy;
pub mod moves;
pub mod temp_cache;

pub use baseline::{
    same_file_time, FolderStatus, InSyncDescrFile, InSyncFile, InSyncFolder, InSyncSymlink,
    FAT_FILE_TIME_PRECISION_SEC,
};
pub use direction::{
    all_elements_equal, apply_fixed_directions, apply_two_way, determine_sync_directions,
    set_sync_direction_rec_children, set_sync_direction_rec_folder,
};
pub use executor::{execute_copy, execute_delete};
pub use filter::{
    add_hard_filtering, add_soft_filtering, apply_filters, set_active_status_rec, FilterConfig,
    NameFilter, SoftFilter,
};
pub use hierarchy::{
    BaseFolderPair, Category, ChildSet, FileAttrs, FilePair, FolderComparison, FolderPair, ItemId,
    Side, SidePair, SymlinkAttrs, SymlinkPair, SyncDir,
};
pub use moves::detect_moved_files;
pub use temp_cache::{FileDescriptor, TempFileBuffer};
