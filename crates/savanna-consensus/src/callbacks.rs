use savanna_forkdb::BlockState;

type Hook = Box<dyn Fn(&BlockState) + Send + Sync>;

/// Explicit callback registry for the four controller signals (SPEC_FULL
/// §4.10, spec §9 "signal emission"). Plain boxed closures rather than an
/// event bus, the way the teacher wires round-transition hooks into its
/// consensus engine — no trait object hierarchy, no async.
///
/// Callbacks are invoked synchronously, and never while the fork-db mutex is
/// held, so a callback may freely call back into the controller's read-only
/// accessors; calling back into `add_block`/`submit_vote` from inside a hook
/// is not supported and will deadlock if the hook is invoked re-entrantly
/// from within another hook of the same registry.
#[derive(Default)]
pub struct Callbacks {
    block_start: Option<Hook>,
    accepted_block_header: Option<Hook>,
    accepted_block: Option<Hook>,
    irreversible_block: Option<Hook>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_block_start(mut self, f: impl Fn(&BlockState) + Send + Sync + 'static) -> Self {
        self.block_start = Some(Box::new(f));
        self
    }

    pub fn on_accepted_block_header(mut self, f: impl Fn(&BlockState) + Send + Sync + 'static) -> Self {
        self.accepted_block_header = Some(Box::new(f));
        self
    }

    pub fn on_accepted_block(mut self, f: impl Fn(&BlockState) + Send + Sync + 'static) -> Self {
        self.accepted_block = Some(Box::new(f));
        self
    }

    pub fn on_irreversible_block(mut self, f: impl Fn(&BlockState) + Send + Sync + 'static) -> Self {
        self.irreversible_block = Some(Box::new(f));
        self
    }

    pub(crate) fn fire_block_start(&self, bs: &BlockState) {
        if let Some(f) = &self.block_start {
            f(bs);
        }
    }

    pub(crate) fn fire_accepted_block_header(&self, bs: &BlockState) {
        if let Some(f) = &self.accepted_block_header {
            f(bs);
        }
    }

    pub(crate) fn fire_accepted_block(&self, bs: &BlockState) {
        if let Some(f) = &self.accepted_block {
            f(bs);
        }
    }

    pub(crate) fn fire_irreversible_block(&self, bs: &BlockState) {
        if let Some(f) = &self.irreversible_block {
            f(bs);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("block_start", &self.block_start.is_some())
            .field("accepted_block_header", &self.accepted_block_header.is_some())
            .field("accepted_block", &self.accepted_block.is_some())
            .field("irreversible_block", &self.irreversible_block.is_some())
            .finish()
    }
}
