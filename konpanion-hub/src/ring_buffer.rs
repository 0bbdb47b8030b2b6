/**
 * RING BUFFER - Historique borné par device
 *
 * FIFO à capacité fixe : quand le buffer est plein, le plus ancien sort.
 * La capacité peut changer à chaud (réglage global du store) mais la
 * réconciliation est paresseuse : elle n'a lieu qu'au prochain push.
 * Capacité 0 = chaque push est jeté, le buffer reste vide.
 */

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enregistre une nouvelle capacité sans toucher au contenu
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            self.items.clear();
            return;
        }
        // trim par l'avant : couvre aussi une capacité réduite depuis le dernier push
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Copie du contenu, du plus ancien au plus récent
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut rb = RingBuffer::new(3);
        for i in 0..5 {
            rb.push(i);
        }
        assert_eq!(rb.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        for cap in 0..6 {
            let mut rb = RingBuffer::new(cap);
            for i in 0..20 {
                rb.push(i);
                assert!(rb.len() <= cap, "cap {} len {}", cap, rb.len());
            }
        }
    }

    #[test]
    fn test_zero_capacity_discards() {
        let mut rb = RingBuffer::new(0);
        rb.push("a");
        rb.push("b");
        assert!(rb.is_empty());
        assert!(rb.to_vec().is_empty());
    }

    #[test]
    fn test_capacity_change_is_lazy() {
        let mut rb = RingBuffer::new(5);
        for i in 0..5 {
            rb.push(i);
        }

        rb.set_capacity(2);
        // rien ne bouge tant qu'on ne pousse pas
        assert_eq!(rb.len(), 5);

        rb.push(5);
        assert_eq!(rb.to_vec(), vec![4, 5]);
    }

    #[test]
    fn test_capacity_growth_keeps_history() {
        let mut rb = RingBuffer::new(2);
        rb.push(1);
        rb.push(2);
        rb.set_capacity(4);
        rb.push(3);
        rb.push(4);
        assert_eq!(rb.to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut rb = RingBuffer::new(4);
        rb.push(1);
        let snap = rb.to_vec();
        rb.push(2);
        assert_eq!(snap, vec![1]);
        assert_eq!(rb.to_vec(), vec![1, 2]);
    }
}
