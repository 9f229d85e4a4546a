use windows::Win32::Graphics::Direct3D12::*;

/// Memoized GPU pipeline objects reused across resize cycles, so a resize
/// pays neither shader recompilation nor buffer reallocation.
#[derive(Default)]
pub struct DrawingCache {
    pub vertex_buffer: Option<ID3D12Resource>,
    vertex_capacity: u64,
    pub root_signature: Option<ID3D12RootSignature>,
    pub pipeline: Option<ID3D12PipelineState>,
}

impl DrawingCache {
    /// The upload buffer is sized for the largest vertex list seen so far.
    /// A longer list forces reallocation; an equal or shorter one reuses
    /// the buffer. Copying a longer list without reallocating would write
    /// past the end of the GPU allocation.
    pub fn needs_vertex_realloc(&self, byte_len: u64) -> bool {
        self.vertex_buffer.is_none() || grown_beyond(self.vertex_capacity, byte_len)
    }

    pub fn store_vertex_buffer(&mut self, buffer: ID3D12Resource, capacity: u64) {
        self.vertex_buffer = Some(buffer);
        self.vertex_capacity = capacity;
    }

    /// Both objects are stored together, and only after full pipeline
    /// construction succeeded; a failed shader compile leaves the cache
    /// untouched.
    pub fn store_pipeline(
        &mut self,
        root_signature: ID3D12RootSignature,
        pipeline: ID3D12PipelineState,
    ) {
        self.root_signature = Some(root_signature);
        self.pipeline = Some(pipeline);
    }
}

fn grown_beyond(capacity: u64, byte_len: u64) -> bool {
    byte_len > capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_always_allocates() {
        let cache = DrawingCache::default();
        assert!(cache.needs_vertex_realloc(0));
        assert!(cache.needs_vertex_realloc(84));
    }

    #[test]
    fn growth_forces_reallocation() {
        assert!(grown_beyond(84, 85));
        assert!(grown_beyond(0, 1));
    }

    #[test]
    fn equal_or_smaller_content_reuses_the_buffer() {
        assert!(!grown_beyond(84, 84));
        assert!(!grown_beyond(84, 28));
    }
}
