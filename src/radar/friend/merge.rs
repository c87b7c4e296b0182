//! 好友列表合并（最后写入者胜出）
//!
//! 以本地列表为基础，逐条比较服务器记录的 `lastContact`，
//! 服务器更新则整条替换，本地缺失则追加。合并不感知删除：
//! 任一侧单独删除的记录不会因为合并而消失。

use crate::radar::friend::models::Friend;
use std::collections::HashMap;

/// 合并本地与服务器好友列表
///
/// 输出顺序：先本地顺序，再按服务器顺序追加仅存在于服务器的记录。
/// 时间戳相同时保留本地记录。
pub fn merge_friends(local: &[Friend], remote: &[Friend]) -> Vec<Friend> {
    let mut merged: Vec<Friend> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(local.len() + remote.len());

    for f in local {
        match index.get(&f.id) {
            Some(&pos) => merged[pos] = f.clone(),
            None => {
                index.insert(f.id.clone(), merged.len());
                merged.push(f.clone());
            }
        }
    }

    for r in remote {
        match index.get(&r.id) {
            Some(&pos) => {
                if r.last_contact > merged[pos].last_contact {
                    merged[pos] = r.clone();
                }
            }
            None => {
                index.insert(r.id.clone(), merged.len());
                merged.push(r.clone());
            }
        }
    }

    merged
}

/// 两个列表按 id 比较是否包含相同的记录（忽略顺序）
pub fn same_records(a: &[Friend], b: &[Friend]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let by_id: HashMap<&str, &Friend> = a.iter().map(|f| (f.id.as_str(), f)).collect();
    b.iter().all(|f| by_id.get(f.id.as_str()) == Some(&f))
}
