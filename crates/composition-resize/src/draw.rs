use std::mem::ManuallyDrop;

use tracing::error;
use windows::core::s;
use windows::core::w;
use windows::core::Interface;
use windows::core::PCSTR;
use windows::Win32::Foundation::*;
use windows::Win32::Graphics::Direct3D::Fxc::*;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::cache::DrawingCache;
use crate::contents::GraphicContents;
use crate::contents::RgbaVertex;
use crate::error::fatal;
use crate::error::fatal_state;
use crate::error::FatalExt;
use crate::error::RenderError;
use crate::error::RenderResult;
use crate::swap_chain::BACK_BUFFER_FORMAT;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.2, 0.4, 1.0];

/// Paint one frame into the given back buffer: refresh the vertex upload,
/// build the pipeline if the cache is cold, record the draw, and submit it
/// to the queue.
#[allow(clippy::too_many_arguments)]
pub fn draw_frame(
    device: &ID3D12Device,
    command_queue: &ID3D12CommandQueue,
    command_list: &ID3D12GraphicsCommandList,
    command_allocator: &ID3D12CommandAllocator,
    render_target: &ID3D12Resource,
    rtv_handle: D3D12_CPU_DESCRIPTOR_HANDLE,
    width: u32,
    height: u32,
    contents: &mut dyn GraphicContents,
    cache: &mut DrawingCache,
) -> RenderResult<()> {
    let vertices = contents.vertices()?;
    let byte_len = upload_vertices(device, &vertices, cache);

    if cache.pipeline.is_none() {
        let shader_source = contents.shader_source()?;
        build_pipeline(device, &shader_source, cache)?;
    }

    let (root_signature, pipeline) = match (&cache.root_signature, &cache.pipeline) {
        (Some(root_signature), Some(pipeline)) => (root_signature, pipeline),
        _ => fatal_state("drawing cache missing pipeline after build"),
    };
    let vertex_buffer = match &cache.vertex_buffer {
        Some(buffer) => buffer,
        None => fatal_state("drawing cache missing vertex buffer after upload"),
    };

    // The allocator is safe to reset here: the frame ring handed this slot
    // back only after its previous submission's fence signaled.
    unsafe { command_allocator.Reset() }.or_fatal("ID3D12CommandAllocator::Reset");
    unsafe { command_list.Reset(command_allocator, pipeline) }
        .or_fatal("ID3D12GraphicsCommandList::Reset");

    let viewport = D3D12_VIEWPORT {
        TopLeftX: 0.0,
        TopLeftY: 0.0,
        Width: width as f32,
        Height: height as f32,
        MinDepth: D3D12_MIN_DEPTH,
        MaxDepth: D3D12_MAX_DEPTH,
    };
    let scissor_rect = RECT {
        left: 0,
        top: 0,
        right: width as i32,
        bottom: height as i32,
    };
    let vertex_buffer_view = D3D12_VERTEX_BUFFER_VIEW {
        BufferLocation: unsafe { vertex_buffer.GetGPUVirtualAddress() },
        StrideInBytes: std::mem::size_of::<RgbaVertex>() as u32,
        SizeInBytes: byte_len as u32,
    };

    unsafe {
        command_list.SetGraphicsRootSignature(root_signature);
        command_list.RSSetViewports(&[viewport]);
        command_list.RSSetScissorRects(&[scissor_rect]);

        command_list.ResourceBarrier(&[transition_barrier(
            render_target,
            D3D12_RESOURCE_STATE_PRESENT,
            D3D12_RESOURCE_STATE_RENDER_TARGET,
        )]);

        command_list.OMSetRenderTargets(1, Some(&rtv_handle), false, None);
        command_list.ClearRenderTargetView(rtv_handle, &CLEAR_COLOR, None);
        command_list.IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
        command_list.IASetVertexBuffers(0, Some(&[vertex_buffer_view]));
        command_list.DrawInstanced(vertices.len() as u32, 1, 0, 0);

        command_list.ResourceBarrier(&[transition_barrier(
            render_target,
            D3D12_RESOURCE_STATE_RENDER_TARGET,
            D3D12_RESOURCE_STATE_PRESENT,
        )]);
    }
    unsafe { command_list.Close() }.or_fatal("ID3D12GraphicsCommandList::Close");

    let command_lists = [Some(
        command_list
            .cast::<ID3D12CommandList>()
            .or_fatal("ID3D12GraphicsCommandList::cast"),
    )];
    unsafe { command_queue.ExecuteCommandLists(&command_lists) };

    Ok(())
}

/// Copy the vertex list into the CPU-writable upload buffer, reallocating
/// first when the list has outgrown it. Returns the byte length written.
fn upload_vertices(
    device: &ID3D12Device,
    vertices: &[RgbaVertex],
    cache: &mut DrawingCache,
) -> u64 {
    let byte_len = std::mem::size_of_val(vertices) as u64;

    if cache.needs_vertex_realloc(byte_len) {
        let capacity = byte_len.max(std::mem::size_of::<RgbaVertex>() as u64);
        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_UPLOAD,
            ..Default::default()
        };
        let resource_desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: capacity,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            ..Default::default()
        };

        let mut vertex_buffer: Option<ID3D12Resource> = None;
        unsafe {
            device.CreateCommittedResource(
                &heap_props,
                D3D12_HEAP_FLAG_NONE,
                &resource_desc,
                D3D12_RESOURCE_STATE_GENERIC_READ,
                None,
                &mut vertex_buffer,
            )
        }
        .or_fatal("ID3D12Device::CreateCommittedResource");
        let vertex_buffer = vertex_buffer.unwrap();
        unsafe { vertex_buffer.SetName(w!("ContentVertexBuffer")) }.ok();
        cache.store_vertex_buffer(vertex_buffer, capacity);
    }

    let vertex_buffer = match &cache.vertex_buffer {
        Some(buffer) => buffer,
        None => fatal_state("vertex buffer missing after allocation"),
    };
    let mapping = MappedBuffer::map(vertex_buffer);
    mapping.write(bytemuck::cast_slice(vertices));

    byte_len
}

/// Scoped CPU mapping of an upload resource; unmaps on every exit path.
struct MappedBuffer<'a> {
    resource: &'a ID3D12Resource,
    data: *mut u8,
}

impl<'a> MappedBuffer<'a> {
    fn map(resource: &'a ID3D12Resource) -> Self {
        let mut data = std::ptr::null_mut();
        // The CPU only writes; an empty read range tells the driver so.
        let read_range = D3D12_RANGE { Begin: 0, End: 0 };
        unsafe { resource.Map(0, Some(&read_range), Some(&mut data)) }
            .or_fatal("ID3D12Resource::Map");
        Self {
            resource,
            data: data as *mut u8,
        }
    }

    fn write(&self, bytes: &[u8]) {
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.data, bytes.len()) };
    }
}

impl Drop for MappedBuffer<'_> {
    fn drop(&mut self) {
        unsafe { self.resource.Unmap(0, None) };
    }
}

/// Compile both stages from the provider's source and build the root
/// signature and pipeline state. The cache is only written once everything
/// succeeded, so a failed compile leaves no partial pipeline behind.
fn build_pipeline(
    device: &ID3D12Device,
    shader_source: &str,
    cache: &mut DrawingCache,
) -> RenderResult<()> {
    let vertex_shader = compile_stage(shader_source, s!("VSMain"), s!("vs_5_0"))?;
    let pixel_shader = compile_stage(shader_source, s!("PSMain"), s!("ps_5_0"))?;

    let root_signature = create_root_signature(device);

    let input_element_descs: [D3D12_INPUT_ELEMENT_DESC; 2] = [
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: s!("POSITION"),
            Format: DXGI_FORMAT_R32G32B32_FLOAT,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            ..Default::default()
        },
        D3D12_INPUT_ELEMENT_DESC {
            SemanticName: s!("COLOR"),
            Format: DXGI_FORMAT_R32G32B32A32_FLOAT,
            AlignedByteOffset: 12,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            ..Default::default()
        },
    ];

    let pso_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
        pRootSignature: unsafe { std::mem::transmute_copy(&root_signature) },
        VS: D3D12_SHADER_BYTECODE {
            pShaderBytecode: unsafe { vertex_shader.GetBufferPointer() },
            BytecodeLength: unsafe { vertex_shader.GetBufferSize() },
        },
        PS: D3D12_SHADER_BYTECODE {
            pShaderBytecode: unsafe { pixel_shader.GetBufferPointer() },
            BytecodeLength: unsafe { pixel_shader.GetBufferSize() },
        },
        InputLayout: D3D12_INPUT_LAYOUT_DESC {
            pInputElementDescs: input_element_descs.as_ptr(),
            NumElements: input_element_descs.len() as u32,
        },
        RasterizerState: D3D12_RASTERIZER_DESC {
            FillMode: D3D12_FILL_MODE_SOLID,
            CullMode: D3D12_CULL_MODE_NONE,
            ..Default::default()
        },
        BlendState: D3D12_BLEND_DESC {
            AlphaToCoverageEnable: FALSE,
            IndependentBlendEnable: FALSE,
            RenderTarget: [
                D3D12_RENDER_TARGET_BLEND_DESC {
                    BlendEnable: FALSE,
                    RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
                    ..Default::default()
                };
                8
            ],
        },
        DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: FALSE,
            StencilEnable: FALSE,
            ..Default::default()
        },
        SampleMask: u32::MAX,
        PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
        NumRenderTargets: 1,
        RTVFormats: [
            BACK_BUFFER_FORMAT,
            DXGI_FORMAT_UNKNOWN,
            DXGI_FORMAT_UNKNOWN,
            DXGI_FORMAT_UNKNOWN,
            DXGI_FORMAT_UNKNOWN,
            DXGI_FORMAT_UNKNOWN,
            DXGI_FORMAT_UNKNOWN,
            DXGI_FORMAT_UNKNOWN,
        ],
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        ..Default::default()
    };

    let pipeline = unsafe { device.CreateGraphicsPipelineState(&pso_desc) }
        .or_fatal("ID3D12Device::CreateGraphicsPipelineState");

    cache.store_pipeline(root_signature, pipeline);
    Ok(())
}

/// Shader text is externally supplied content, so a failed compile is a
/// reportable error carrying the compiler's diagnostics, never a crash.
fn compile_stage(source: &str, entry_point: PCSTR, target: PCSTR) -> RenderResult<ID3DBlob> {
    let compile_flags = if cfg!(debug_assertions) {
        D3DCOMPILE_DEBUG | D3DCOMPILE_SKIP_OPTIMIZATION
    } else {
        0
    };

    let mut shader_blob = None;
    let mut error_blob = None;
    let result = unsafe {
        D3DCompile(
            source.as_ptr() as *const _,
            source.len(),
            s!("graphic_contents"),
            None,
            None,
            entry_point,
            target,
            compile_flags,
            0,
            &mut shader_blob,
            Some(&mut error_blob),
        )
    };

    match result {
        Ok(()) => Ok(shader_blob.unwrap()),
        Err(error) => {
            let diagnostics = match blob_text(&error_blob) {
                text if text.is_empty() => error.to_string(),
                text => text,
            };
            Err(RenderError::ShaderCompilation { diagnostics })
        }
    }
}

// An empty root signature that permits an input layout is sufficient here.
fn create_root_signature(device: &ID3D12Device) -> ID3D12RootSignature {
    let desc = D3D12_ROOT_SIGNATURE_DESC {
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
        ..Default::default()
    };

    let mut signature_blob = None;
    let mut error_blob = None;
    let serialized = unsafe {
        D3D12SerializeRootSignature(
            &desc,
            D3D_ROOT_SIGNATURE_VERSION_1,
            &mut signature_blob,
            Some(&mut error_blob),
        )
    };
    if let Err(serialize_error) = serialized {
        error!(
            "root signature serialization: {}",
            blob_text(&error_blob)
        );
        fatal("D3D12SerializeRootSignature", serialize_error.code());
    }
    let signature_blob = signature_blob.unwrap();

    unsafe {
        device.CreateRootSignature(
            0,
            std::slice::from_raw_parts(
                signature_blob.GetBufferPointer() as *const u8,
                signature_blob.GetBufferSize(),
            ),
        )
    }
    .or_fatal("ID3D12Device::CreateRootSignature")
}

fn blob_text(blob: &Option<ID3DBlob>) -> String {
    match blob {
        Some(blob) => unsafe {
            String::from_utf8_lossy(std::slice::from_raw_parts(
                blob.GetBufferPointer() as *const u8,
                blob.GetBufferSize(),
            ))
        }
        .trim_end_matches('\0')
        .trim()
        .to_string(),
        None => String::new(),
    }
}

fn transition_barrier(
    resource: &ID3D12Resource,
    state_before: D3D12_RESOURCE_STATES,
    state_after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: unsafe { std::mem::transmute_copy(resource) },
                StateBefore: state_before,
                StateAfter: state_after,
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
            }),
        },
    }
}
