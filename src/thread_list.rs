use crate::thread::ThreadId;

/// Order in which queued threads come back out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Discipline {
    /// Inserts at the head: the thread queued last leaves first.
    #[default]
    Lifo,
    /// Inserts at the tail: the thread queued first leaves first.
    Fifo,
}

/// Storage of the `next` links threaded through the thread control blocks.
pub(crate) trait Links {
    fn next_mut(&mut self, id: ThreadId) -> &mut Option<ThreadId>;
}

/// A queue of threads, linked through their control blocks.
///
/// The list owns nothing; it only remembers the ends. A thread must be in at
/// most one list at a time since there is only one link per block.
#[derive(Debug)]
pub(crate) struct ThreadList {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
    len: u8,
}

impl ThreadList {
    pub const fn new() -> Self {
        ThreadList {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn push<L: Links>(&mut self, links: &mut L, thread: ThreadId, discipline: Discipline) {
        match discipline {
            Discipline::Lifo => {
                *links.next_mut(thread) = self.head;
                self.head = Some(thread);
                if self.tail.is_none() {
                    self.tail = Some(thread);
                }
            }
            Discipline::Fifo => {
                *links.next_mut(thread) = None;
                match self.tail {
                    Some(tail) => *links.next_mut(tail) = Some(thread),
                    None => self.head = Some(thread),
                }
                self.tail = Some(thread);
            }
        }
        self.len += 1;
    }

    pub fn pop<L: Links>(&mut self, links: &mut L) -> Option<ThreadId> {
        let thread = self.head?;
        self.head = links.next_mut(thread).take();
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(thread)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }
}
