//! 基线快照的 SQLite 持久化
//!
//! 每个基准目录对以 `pair_key` 为键存一组行，读出时重建为
//! [`InSyncFolder`] 树。运行期间引擎只读这棵树；同步成功后整体重建
//! （一个事务内先删后插）。

use crate::config::CompareVariant;
use crate::core::baseline::{
    FolderStatus, InSyncDescrFile, InSyncFile, InSyncFolder, InSyncSymlink,
};
use crate::core::hierarchy::BaseFolderPair;
use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// 基准目录对的持久化键（两侧展示路径的短哈希）
pub fn pair_key(base: &BaseFolderPair) -> String {
    let cookie = format!(
        "{}\n{}",
        base.base_paths.left.display(),
        base.base_paths.right.display()
    );
    blake3::hash(cookie.as_bytes()).to_hex()[..16].to_string()
}

fn cmp_variant_to_str(v: CompareVariant) -> &'static str {
    match v {
        CompareVariant::TimeSize => "timesize",
        CompareVariant::Content => "content",
        CompareVariant::Size => "size",
    }
}

fn cmp_variant_from_str(s: &str) -> CompareVariant {
    match s {
        "content" => CompareVariant::Content,
        "size" => CompareVariant::Size,
        _ => CompareVariant::TimeSize,
    }
}

/// 数据库行
#[derive(Debug, sqlx::FromRow)]
struct BaselineRow {
    rel_path: String,
    item_kind: String,
    left_mod_time: i64,
    right_mod_time: i64,
    left_print: i64,
    right_print: i64,
    file_size: i64,
    cmp_variant: String,
    folder_status: String,
}

/// 基线存储
pub struct BaselineStore {
    pool: SqlitePool,
}

impl BaselineStore {
    /// 打开（必要时创建）基线数据库并执行迁移
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Windows 路径的反斜杠需要换成正斜杠才能进连接串
        let db_path_str = db_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("数据库路径非法"))?
            .replace('\\', "/");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&format!("sqlite:{}?mode=rwc", db_path_str))
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// 内存数据库（测试用）
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// 读取某个目录对的基线；没有记录返回 None（首次同步）
    pub async fn load(&self, pair_key: &str) -> Result<Option<InSyncFolder>> {
        let rows = sqlx::query_as::<_, BaselineRow>(
            "SELECT rel_path, item_kind, left_mod_time, right_mod_time, left_print, right_print, \
             file_size, cmp_variant, folder_status \
             FROM baseline_entries WHERE pair_key = ? ORDER BY rel_path",
        )
        .bind(pair_key)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut root = InSyncFolder::new(FolderStatus::InSync);
        for row in &rows {
            let segments: Vec<&str> = row.rel_path.split('/').collect();
            let (name, parents) = match segments.split_last() {
                Some((name, parents)) => (*name, parents),
                None => continue,
            };
            let parent = ensure_folder_chain(&mut root, parents);

            match row.item_kind.as_str() {
                "file" => {
                    parent.files.insert(
                        name.to_string(),
                        InSyncFile {
                            left: InSyncDescrFile {
                                mod_time: row.left_mod_time,
                                print: row.left_print as u64,
                            },
                            right: InSyncDescrFile {
                                mod_time: row.right_mod_time,
                                print: row.right_print as u64,
                            },
                            file_size: row.file_size as u64,
                            cmp_variant: cmp_variant_from_str(&row.cmp_variant),
                        },
                    );
                }
                "symlink" => {
                    parent.symlinks.insert(
                        name.to_string(),
                        InSyncSymlink {
                            left_mod_time: row.left_mod_time,
                            right_mod_time: row.right_mod_time,
                            cmp_variant: cmp_variant_from_str(&row.cmp_variant),
                        },
                    );
                }
                "folder" => {
                    let status = if row.folder_status == "strawman" {
                        FolderStatus::StrawMan
                    } else {
                        FolderStatus::InSync
                    };
                    parent
                        .folders
                        .entry(name.to_string())
                        .or_insert_with(|| InSyncFolder::new(status))
                        .status = status;
                }
                other => {
                    debug!("未知的基线条目类型, 忽略: {}", other);
                }
            }
        }

        debug!("已加载 {} 条基线记录 (pair_key={})", rows.len(), pair_key);
        Ok(Some(root))
    }

    /// 整体重建某个目录对的基线（事务内先删后插）
    pub async fn save(&self, pair_key: &str, root: &InSyncFolder) -> Result<()> {
        let mut rows = Vec::new();
        flatten_folder(root, "", &mut rows);

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM baseline_entries WHERE pair_key = ?")
            .bind(pair_key)
            .execute(&mut *tx)
            .await?;

        let count = rows.len();
        for row in rows {
            sqlx::query(
                r#"INSERT INTO baseline_entries
                   (pair_key, rel_path, item_kind, left_mod_time, right_mod_time,
                    left_print, right_print, file_size, cmp_variant, folder_status, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(pair_key)
            .bind(&row.rel_path)
            .bind(&row.item_kind)
            .bind(row.left_mod_time)
            .bind(row.right_mod_time)
            .bind(row.left_print)
            .bind(row.right_print)
            .bind(row.file_size)
            .bind(&row.cmp_variant)
            .bind(&row.folder_status)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("已写入 {} 条基线记录 (pair_key={})", count, pair_key);
        Ok(())
    }

    /// 删除某个目录对的全部基线记录
    pub async fn delete(&self, pair_key: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM baseline_entries WHERE pair_key = ?")
            .bind(pair_key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn ensure_folder_chain<'a>(root: &'a mut InSyncFolder, parents: &[&str]) -> &'a mut InSyncFolder {
    let mut current = root;
    for segment in parents {
        current = current
            .folders
            .entry((*segment).to_string())
            // 行序不保证父先于子，缺失的中间目录先占位
            .or_insert_with(|| InSyncFolder::new(FolderStatus::StrawMan));
    }
    current
}

fn flatten_folder(folder: &InSyncFolder, prefix: &str, out: &mut Vec<BaselineRow>) {
    let join = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    };

    for (name, file) in &folder.files {
        out.push(BaselineRow {
            rel_path: join(name),
            item_kind: "file".to_string(),
            left_mod_time: file.left.mod_time,
            right_mod_time: file.right.mod_time,
            left_print: file.left.print as i64,
            right_print: file.right.print as i64,
            file_size: file.file_size as i64,
            cmp_variant: cmp_variant_to_str(file.cmp_variant).to_string(),
            folder_status: String::new(),
        });
    }
    for (name, link) in &folder.symlinks {
        out.push(BaselineRow {
            rel_path: join(name),
            item_kind: "symlink".to_string(),
            left_mod_time: link.left_mod_time,
            right_mod_time: link.right_mod_time,
            left_print: 0,
            right_print: 0,
            file_size: 0,
            cmp_variant: cmp_variant_to_str(link.cmp_variant).to_string(),
            folder_status: String::new(),
        });
    }
    for (name, sub) in &folder.folders {
        out.push(BaselineRow {
            rel_path: join(name),
            item_kind: "folder".to_string(),
            left_mod_time: 0,
            right_mod_time: 0,
            left_print: 0,
            right_print: 0,
            file_size: 0,
            cmp_variant: cmp_variant_to_str(CompareVariant::TimeSize).to_string(),
            folder_status: if sub.status == FolderStatus::StrawMan {
                "strawman".to_string()
            } else {
                "insync".to_string()
            },
        });
        flatten_folder(sub, &join(name), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> InSyncFolder {
        let mut root = InSyncFolder::new(FolderStatus::InSync);
        root.files.insert(
            "a.txt".to_string(),
            InSyncFile {
                left: InSyncDescrFile {
                    mod_time: 100,
                    print: 7,
                },
                right: InSyncDescrFile {
                    mod_time: 102,
                    print: 9,
                },
                file_size: 10,
                cmp_variant: CompareVariant::TimeSize,
            },
        );
        root.symlinks.insert(
            "link".to_string(),
            InSyncSymlink {
                left_mod_time: 200,
                right_mod_time: 200,
                cmp_variant: CompareVariant::Content,
            },
        );
        let mut sub = InSyncFolder::new(FolderStatus::StrawMan);
        sub.files.insert(
            "nested.bin".to_string(),
            InSyncFile {
                left: InSyncDescrFile {
                    mod_time: 300,
                    print: 0,
                },
                right: InSyncDescrFile {
                    mod_time: 300,
                    print: 0,
                },
                file_size: 42,
                cmp_variant: CompareVariant::Content,
            },
        );
        root.folders.insert("sub".to_string(), sub);
        root
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = BaselineStore::open_in_memory().await.unwrap();
        let tree = sample_tree();

        store.save("pair-1", &tree).await.unwrap();
        let loaded = store.load("pair-1").await.unwrap().unwrap();
        assert_eq!(loaded, tree);

        // 不存在的键是合法的首次同步状态
        assert!(store.load("pair-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_wholesale() {
        let store = BaselineStore::open_in_memory().await.unwrap();
        store.save("pair-1", &sample_tree()).await.unwrap();

        // 重建后旧条目消失
        let replacement = InSyncFolder::new(FolderStatus::InSync);
        store.save("pair-1", &replacement).await.unwrap();
        let loaded = store.load("pair-1").await.unwrap();
        assert!(loaded.is_none() || loaded.unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn test_delete_clears_pair() {
        let store = BaselineStore::open_in_memory().await.unwrap();
        store.save("pair-1", &sample_tree()).await.unwrap();

        let removed = store.delete("pair-1").await.unwrap();
        assert!(removed > 0);
        assert!(store.load("pair-1").await.unwrap().is_none());
    }
}
