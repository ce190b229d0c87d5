use std::collections::VecDeque;

/// 新しい順に最大 `capacity` 件だけ保持するリスト
///
/// 監査ログ・通知・バックアップ履歴で共通して使う。
#[derive(Debug, Clone)]
pub struct BoundedList<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedList<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn from_newest_first(items: Vec<T>, capacity: usize) -> Self {
        let mut items: VecDeque<T> = items.into();
        items.truncate(capacity);
        Self { items, capacity }
    }

    pub fn from_oldest_first(items: Vec<T>, capacity: usize) -> Self {
        let mut items: VecDeque<T> = items.into_iter().rev().collect();
        items.truncate(capacity);
        Self { items, capacity }
    }

    /// 先頭に追加し、溢れた古い要素の件数を返す
    pub fn push(&mut self, item: T) -> usize {
        self.items.push_front(item);
        let evicted = self.items.len().saturating_sub(self.capacity);
        self.items.truncate(self.capacity);
        evicted
    }

    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.items.len();
        self.items.retain(|item| keep(item));
        before - self.items.len()
    }

    pub fn remove_first<F>(&mut self, mut matches: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let index = self.items.iter().position(|item| matches(item))?;
        self.items.remove(index)
    }

    pub fn find<F>(&self, mut matches: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter().find(|item| matches(item))
    }

    pub fn find_mut<F>(&mut self, mut matches: F) -> Option<&mut T>
    where
        F: FnMut(&T) -> bool,
    {
        self.items.iter_mut().find(|item| matches(item))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> BoundedList<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn to_vec_oldest_first(&self) -> Vec<T> {
        self.items.iter().rev().cloned().collect()
    }
}
